use crate::catalog::ModelInfo;
use crate::types::{ChatRequest, EndpointSurface};

/// Picks the endpoint surface for a request.
///
/// Precedence: the request's explicit override, then catalog metadata for models that
/// only support one surface, then advanced-only parameters for models that support
/// both. Missing metadata always means [`EndpointSurface::Chat`].
pub fn resolve_surface(request: &ChatRequest, model: Option<&ModelInfo>) -> EndpointSurface {
    if let Some(surface) = request.surface {
        return surface;
    }

    let Some(support) = model.and_then(|info| info.surfaces) else {
        return EndpointSurface::Chat;
    };

    match (support.chat, support.responses) {
        (false, true) => EndpointSurface::Responses,
        (true, true) if request.uses_advanced_parameters() => EndpointSurface::Responses,
        _ => EndpointSurface::Chat,
    }
}
