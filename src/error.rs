use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// A device allocation failed. The frame is skipped and previously
    /// allocated resources stay in use.
    #[error("failed to allocate {what}: {message}")]
    Resource { what: &'static str, message: String },

    /// A frame stage ran before the resources it depends on existed.
    #[error("precondition violated: {0}")]
    Precondition(&'static str),

    #[error("no compatible GPU adapter available")]
    NoAdapter,

    #[error("request_device failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("surface creation failed: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    #[error("window creation failed: {0}")]
    Window(#[from] winit::error::OsError),

    #[error("failed to load environment map: {0}")]
    EnvironmentMap(#[from] image::ImageError),
}

/// Checks a sequencing contract. Debug builds abort on a violation, release
/// builds log it and return `RenderError::Precondition` so the caller can skip
/// the stage.
///
/// The `let` form binds the pattern for the rest of the enclosing block.
#[macro_export]
macro_rules! precondition {
    (let $pattern:pat = $value:expr, $what:literal) => {
        let $pattern = $value else {
            debug_assert!(false, $what);
            tracing::error!("precondition violated: {}", $what);
            return Err($crate::error::RenderError::Precondition($what));
        };
    };
    ($cond:expr, $what:literal) => {
        if !$cond {
            debug_assert!($cond, $what);
            tracing::error!("precondition violated: {}", $what);
            return Err($crate::error::RenderError::Precondition($what));
        }
    };
}
