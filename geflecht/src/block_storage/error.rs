use err_derive::Error;

/// An error of the `block_storage` module.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The `Keyblock` could not be stored correctly.
    #[error(display = "{}", 0)]
    Sled(#[error(from)] sled::Error),

    /// The `Keyblock` could not be encoded correctly.
    #[error(display = "{}", 0)]
    Encoding(#[error(from)] postcard::Error),

    /// Only sealed blocks (signature and hash present) can be stored.
    #[error(display = "block is not sealed")]
    UnsealedBlock,
}
