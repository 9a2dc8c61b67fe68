//! External metadata lookup

use axum::extract::{Path, State};
use axum::Json;

use crate::AppState;
use docshelf_common::{
    auth::AuthContext,
    errors::{AppError, Result},
    lookup::LookupFields,
};

/// Resolve an identifier (e.g. a DOI, which contains slashes) to document fields
pub async fn lookup(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(identifier): Path<String>,
) -> Result<Json<LookupFields>> {
    let identifier = identifier.trim_matches('/');
    if identifier.is_empty() {
        return Err(AppError::MissingField {
            field: "identifier".to_string(),
        });
    }

    tracing::info!(identifier, user = %auth.user_id, "Metadata lookup");
    let fields = state.lookup.lookup(identifier).await?;
    Ok(Json(fields))
}
