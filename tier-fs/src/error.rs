use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    #[error("not enough free sectors on the device")]
    NoSpace,
    #[error("the name already exists in this directory")]
    AlreadyExists,
    #[error("no such name in this directory")]
    NotFound,
    #[error("the entry is not of the expected kind")]
    WrongKind,
    #[error("the root directory has no parent")]
    RootHasNoParent,
    #[error("the directory table is full")]
    DirectoryFull,
    #[error("file size exceeds the addressable maximum")]
    FileTooLarge,
    #[error("directory size exceeds the direct pointer tier")]
    DirectoryTooLarge,
    #[error("file name is too long")]
    NameTooLong,
}

pub type Result<T> = core::result::Result<T, FsError>;
