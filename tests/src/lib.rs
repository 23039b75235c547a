//! Cross-crate tests exercising the session manager against a file-backed
//! token store.

#[cfg(test)]
mod unit;
