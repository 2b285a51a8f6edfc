//! Error types in packedforest
//!

use thiserror::Error;

use ndarray::ShapeError;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid parameter {0}")]
    Parameters(String),
    #[error("unknown parameter name {0}")]
    UnknownParameter(String),
    #[error("unimplemented forest type: {0}")]
    UnimplementedForestType(String),
    #[error("invalid data {0}")]
    Data(String),
    #[error("could not read csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid ndarray shape {0}")]
    NdShape(#[from] ShapeError),
    #[error("fewer than two classes represented after {attempts} bootstrap attempts")]
    BootstrapExhausted { attempts: usize },
    #[error("corrupt packed forest: {0}")]
    Packing(String),
    #[error("{0}")]
    Unsupported(String),
}
