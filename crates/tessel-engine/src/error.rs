use crate::device::ShaderStage;

/// Errors raised by GPU resources and batchers.
///
/// Two families:
/// - misuse (`AlreadyDrawing`, `NotDrawing`, `CapacityExceeded`, `InvalidGeometry`,
///   `UniformSize`): wrong call sequencing or sizing by the caller; never retried.
/// - resource (`ShaderCompile`, `ShaderLink`, `LocationNotFound`, ...): reported by the driver.
///   Suppressed while the context is lost, because everything is rebuilt on restore.
///
/// Context loss itself is not an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("{what} is already drawing; call end() before begin()")]
    AlreadyDrawing { what: &'static str },

    #[error("{what} is not drawing; call begin() first")]
    NotDrawing { what: &'static str },

    #[error("{what}: requested {requested}, capacity is {capacity}")]
    CapacityExceeded {
        what: &'static str,
        requested: usize,
        capacity: usize,
    },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(&'static str),

    #[error("uniform {name}: expected {expected} floats, got {actual}")]
    UniformSize {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("couldn't compile {stage:?} shader: {log}")]
    ShaderCompile { stage: ShaderStage, log: String },

    #[error("couldn't link shader program: {log}")]
    ShaderLink { log: String },

    #[error("shader program is not compiled")]
    NotCompiled,

    #[error("couldn't find location for uniform {0}")]
    LocationNotFound(String),

    #[error("couldn't find location for attribute {0}")]
    AttributeNotFound(String),

    #[error("driver refused to create a {0}")]
    ResourceCreation(&'static str),
}

impl RenderError {
    /// Returns `true` for errors caused by incorrect call sequencing or sizing.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            RenderError::AlreadyDrawing { .. }
                | RenderError::NotDrawing { .. }
                | RenderError::CapacityExceeded { .. }
                | RenderError::InvalidGeometry(_)
                | RenderError::UniformSize { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn misuse_classification() {
        assert!(RenderError::AlreadyDrawing { what: "PolygonBatcher" }.is_misuse());
        assert!(
            RenderError::CapacityExceeded { what: "mesh vertices", requested: 10, capacity: 4 }
                .is_misuse()
        );
        assert!(!RenderError::ShaderLink { log: String::new() }.is_misuse());
        assert!(!RenderError::LocationNotFound("u_projTrans".into()).is_misuse());
    }

    #[test]
    fn messages_carry_context() {
        let err = RenderError::CapacityExceeded { what: "mesh indices", requested: 9, capacity: 6 };
        assert_eq!(err.to_string(), "mesh indices: requested 9, capacity is 6");
    }
}
