//! Update builder types for entity mutations.
//!
//! Each builder produces an update struct with `Option` fields. Only `Some`
//! fields are applied, and the struct is serialized as the trail `data`
//! payload (changed fields only).

pub mod organization;
