use lensfix_core::CoeffsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("failed to read image {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to write image {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image has zero width or height")]
    EmptyImage,
    #[error("camera matrix is not invertible")]
    SingularCameraMatrix,
    #[error(transparent)]
    Coeffs(#[from] CoeffsError),
}
