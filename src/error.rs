use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("requested wait: {requested}s interrupted at {elapsed}s")]
    Aborted { requested: u64, elapsed: u64 },
    #[error("no auth header provided")]
    Unauthenticated,
    #[error("failed filtering response")]
    FieldMask,
}
