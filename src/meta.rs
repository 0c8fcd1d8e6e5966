//! Provenance metadata describing the transformations a spectrum list has
//! been put through.
use crate::params::{impl_param_described, ParamList, UserParam};

/// Describe one stage of a data processing pipeline
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingMethod {
    /// The order of application of this method in the processing pipeline
    pub order: i8,
    /// An identifier for the software that applied the method
    pub software_reference: String,
    pub params: ParamList,
}

impl_param_described!(ProcessingMethod);

/// A complete data processing pipeline, a series of [`ProcessingMethod`]
/// stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataProcessing {
    /// The identifier for this data processing pipeline
    pub id: String,
    /// The set of processing steps applied
    pub methods: Vec<ProcessingMethod>,
}

impl DataProcessing {
    pub fn push(&mut self, method: ProcessingMethod) {
        self.methods.push(method)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProcessingMethod> {
        self.methods.iter()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn highest_order(&self) -> i8 {
        self.iter().map(|p| p.order).max().unwrap_or_default()
    }
}

/// The user parameter value stamped onto a [`DataProcessing`] record when a
/// spectrum list is wrapped for demultiplexing. Downstream consumers detect
/// demultiplexed data by looking for this token.
pub const DEMUX_PROCESSING_NAME: &str = "demultiplexing";

/// Build the [`ProcessingMethod`] recording a demultiplexing pass
pub fn demux_processing_method(order: i8) -> ProcessingMethod {
    ProcessingMethod {
        order,
        software_reference: String::new(),
        params: vec![UserParam::new("data processing", DEMUX_PROCESSING_NAME)],
    }
}
