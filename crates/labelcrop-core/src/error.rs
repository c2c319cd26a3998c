use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelCropError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("No input documents supplied")]
    NoInput,

    #[error("Page {0} does not exist")]
    PageOutOfRange(usize),

    #[error("Content layout failed: {0}")]
    LayoutError(String),

    #[error("Rasterization failed: {0}")]
    RenderError(String),

    #[error("Image encoding failed: {0}")]
    EncodeError(String),

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Failed to save PDF: {0}")]
    SaveError(String),
}

impl From<lopdf::Error> for LabelCropError {
    fn from(err: lopdf::Error) -> Self {
        LabelCropError::OperationError(err.to_string())
    }
}
