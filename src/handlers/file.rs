//! Static files and `send_file`.
//!
//! # Responsibilities
//! - Map request paths onto the public directory without escaping it
//! - Read a file into a response with a content type from [`MimeTypes`]
//! - Expose `handler.file.before_render` / `after_render`
//!
//! # Data Flow
//! ```text
//! path → handler.file.before_render (path may be rewritten)
//!      → read → content type, charset, disposition
//!      → handler.file.after_render (response) → Response
//! ```

use axum::http::{header, StatusCode};
use percent_encoding::percent_decode_str;
use std::path::{Component, Path, PathBuf};

use crate::dispatch::Flow;
use crate::error::Error;
use crate::hooks::{HookArgs, HookTable, HookType, Hookable};
use crate::http::{MimeTypes, Response};

pub const BEFORE_RENDER: &str = "handler.file.before_render";
pub const AFTER_RENDER: &str = "handler.file.after_render";

/// Options for `send_file`.
#[derive(Debug, Clone, Default)]
pub struct SendFileOptions {
    /// Content type or short name (`css`); guessed from the extension otherwise.
    pub content_type: Option<String>,
    /// Serve as an attachment with this file name.
    pub filename: Option<String>,
    /// Treat the path as a filesystem path instead of public-relative.
    pub system_path: bool,
    pub status: Option<StatusCode>,
}

impl SendFileOptions {
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn system_path(mut self) -> Self {
        self.system_path = true;
        self
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }
}

/// The `handler.file` hook candidate.
pub struct FileHandler {
    public_dir: Option<PathBuf>,
    charset: String,
    hooks: HookTable,
}

impl FileHandler {
    pub fn new(public_dir: Option<PathBuf>, charset: impl Into<String>) -> Self {
        Self {
            public_dir,
            charset: charset.into(),
            hooks: HookTable::new([BEFORE_RENDER, AFTER_RENDER]),
        }
    }

    pub fn public_dir(&self) -> Option<&Path> {
        self.public_dir.as_deref()
    }

    /// Existing file under the public directory for a URL path.
    pub fn resolve_public(&self, request_path: &str) -> Option<PathBuf> {
        let decoded = percent_decode_str(request_path).decode_utf8().ok()?;
        self.under_public(Path::new(decoded.as_ref()))
    }

    /// Existing file for `send_file`.
    pub fn resolve(&self, path: &Path, system_path: bool) -> Option<PathBuf> {
        if system_path {
            return path.is_file().then(|| path.to_path_buf());
        }
        self.under_public(path)
    }

    fn under_public(&self, path: &Path) -> Option<PathBuf> {
        let root = self.public_dir.as_ref()?;
        let mut full = root.clone();
        for component in path.components() {
            match component {
                Component::Normal(part) => full.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => return None,
            }
        }
        (full != *root && full.is_file()).then_some(full)
    }

    /// Read `path` into a response.
    pub fn render(&self, path: &Path, mime: &MimeTypes, options: &SendFileOptions) -> Flow<Response> {
        let mut path = path.to_path_buf();
        self.execute_hook(BEFORE_RENDER, &mut HookArgs::File(&mut path))?;

        let body = std::fs::read(&path).map_err(Error::from)?;
        let mut content_type = match &options.content_type {
            Some(ct) if ct.contains('/') => ct.clone(),
            Some(short) => mime.for_name(short).unwrap_or(mime.default_type()).to_string(),
            None => mime.for_file(&path).to_string(),
        };
        if content_type.starts_with("text/") && !content_type.contains("charset") {
            content_type = format!("{content_type}; charset={}", self.charset);
        }

        let mut response = Response::with_status(options.status.unwrap_or(StatusCode::OK));
        response.set_content_type(&content_type)?;
        if let Some(filename) = &options.filename {
            response.set_header(
                header::CONTENT_DISPOSITION.as_str(),
                &format!("attachment; filename=\"{}\"", filename.replace('"', "")),
            )?;
        }
        response.set_body(body);
        tracing::debug!(path = %path.display(), content_type = %content_type, "Serving file");

        self.execute_hook(AFTER_RENDER, &mut HookArgs::Response(&mut response))?;
        Ok(response)
    }
}

impl Hookable for FileHandler {
    fn hook_type(&self) -> HookType {
        HookType::Handler
    }

    fn candidate_name(&self) -> &str {
        "file"
    }

    fn hook_table(&self) -> &HookTable {
        &self.hooks
    }
}

impl std::fmt::Debug for FileHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandler")
            .field("public_dir", &self.public_dir)
            .field("hooks", &self.hooks)
            .finish()
    }
}
