//! For some reason, the mongodb crate doesn't provide error code constants.
//! This module fills in the gaps.

use mongodb::error::{Error as DbError, ErrorKind, WriteFailure};

pub const DUPLICATE_KEY: i32 = 11000;
pub const WRITE_CONFLICT: i32 = 112;

/// Return true if the given error is a duplicate key write error.
pub fn is_duplicate_key_error(err: &DbError) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(ref e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// Return true if the given error is a transactional write conflict, i.e.
/// another transaction touched the same document first.
pub fn is_write_conflict(err: &DbError) -> bool {
    if err.contains_label("TransientTransactionError") {
        return true;
    }
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref e)) => e.code == WRITE_CONFLICT,
        ErrorKind::Command(ref e) => e.code == WRITE_CONFLICT,
        _ => false,
    }
}
