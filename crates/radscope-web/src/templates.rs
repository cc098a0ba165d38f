//! minijinja page templates.
//!
//! Files in the configured template directory win; the built-in copies are
//! used when a file is absent so the binary runs from any working directory.

use std::path::PathBuf;

use minijinja::{Environment, ErrorKind, Value};

use crate::error::ApiError;

pub const INDEX: &str = "index.html";
pub const REFRESH: &str = "refresh.html";

fn builtin(name: &str) -> Option<&'static str> {
    match name {
        INDEX => Some(include_str!("../templates/index.html")),
        REFRESH => Some(include_str!("../templates/refresh.html")),
        _ => None,
    }
}

pub struct Templates {
    env: Environment<'static>,
}

impl std::fmt::Debug for Templates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Templates").finish_non_exhaustive()
    }
}

impl Templates {
    pub fn new(dir: PathBuf) -> Self {
        let mut env = Environment::new();
        env.set_loader(move |name| {
            if name.contains("..") {
                return Ok(None);
            }
            match std::fs::read_to_string(dir.join(name)) {
                Ok(source) => Ok(Some(source)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(builtin(name).map(str::to_string)),
                Err(e) => Err(minijinja::Error::new(ErrorKind::InvalidOperation, "template could not be read")
                    .with_source(e)),
            }
        });
        Self { env }
    }

    pub fn render(&self, name: &str, ctx: Value) -> Result<String, ApiError> {
        let template = self
            .env
            .get_template(name)
            .map_err(|e| ApiError::Internal(format!("template {name}: {e}")))?;
        template
            .render(ctx)
            .map_err(|e| ApiError::Internal(format!("render {name}: {e}")))
    }
}
