//! Scene inputs: the perspective camera and the OBJ mesh parser.
//!
//! # Invariants
//! - Parsing never fails; unsupported input becomes a [`ParseWarning`].
//! - Parsed geometry is de-indexed and triangulated, three vertices per
//!   triangle, ready to upload without an index buffer.

mod camera;
mod obj;

pub use camera::{Camera, MAX_FOV, MIN_FOV};
pub use obj::{load_obj, parse_obj, Geometry, ObjDocument, ObjError, ParseWarning};

pub fn crate_info() -> &'static str {
    "kiln-scene v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("scene"));
    }
}
