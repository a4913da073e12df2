use crate::ParameterDefinition;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("duplicate parameter number {number} in catalog {model}")]
    DuplicateParameter { model: String, number: u16 },
    #[error("parameter number 0 is reserved (catalog {0})")]
    ReservedNumber(String),
    #[error("batch limit {limit} out of range 1..={max}")]
    InvalidBatchLimit { limit: usize, max: usize },
    #[error("model name must not be empty")]
    EmptyModel,
}

/// Immutable table of a model's parameter definitions, ordered by number.
#[derive(Debug, Clone)]
pub struct ParameterCatalog {
    model: String,
    params: Vec<ParameterDefinition>,
}

impl ParameterCatalog {
    pub fn new(
        model: impl Into<String>,
        mut params: Vec<ParameterDefinition>,
    ) -> Result<Self, CatalogError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(CatalogError::EmptyModel);
        }
        let mut seen = HashSet::with_capacity(params.len());
        for p in &params {
            if p.number == 0 {
                return Err(CatalogError::ReservedNumber(model));
            }
            if !seen.insert(p.number) {
                return Err(CatalogError::DuplicateParameter {
                    model,
                    number: p.number,
                });
            }
        }
        params.sort_by_key(|p| p.number);
        Ok(Self { model, params })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterDefinition> {
        self.params.iter()
    }

    pub fn get(&self, number: u16) -> Option<&ParameterDefinition> {
        self.params
            .binary_search_by_key(&number, |p| p.number)
            .ok()
            .map(|i| &self.params[i])
    }

    /// Parameters to read on a run, in ascending number order.
    ///
    /// Entries flagged `acquire` are always included; the rest only when
    /// `include_all_records` is set.
    pub fn parameters_to_acquire(&self, include_all_records: bool) -> Vec<&ParameterDefinition> {
        self.params
            .iter()
            .filter(|p| p.acquire || include_all_records)
            .collect()
    }
}
