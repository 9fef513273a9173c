pub mod filesystem;

pub use filesystem::{
    list_books, read_metadata, BookLayout, BookMetadata, BookStorage,
    ALIGNMENT_OUTPUTS, TEXT_FILE_NAME,
};
