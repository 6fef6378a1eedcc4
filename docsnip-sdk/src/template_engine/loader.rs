//! Load `.tera` template files from a scenario directory.

use std::path::Path;

use tera::Tera;

use crate::scenario::TemplateFile;

/// Load all `.tera` files from a scenario directory into a Tera instance.
///
/// The templates are registered by their filename (e.g., `python.tera`).
pub(crate) fn load_templates_from_dir(template_dir: &Path) -> Result<Tera, LoaderError> {
    let glob_pattern = template_dir.join("*.tera").to_string_lossy().to_string();

    Tera::new(&glob_pattern).map_err(|e| LoaderError::Tera {
        dir: template_dir.to_path_buf(),
        source: e,
    })
}

/// Load only the given template files, registered under their template names.
///
/// Files outside the list are never parsed, so a broken template for one
/// language cannot fail the others.
pub(crate) fn load_template_files(
    template_dir: &Path,
    files: &[TemplateFile],
) -> Result<Tera, LoaderError> {
    let mut tera = Tera::default();
    tera.add_template_files(
        files
            .iter()
            .map(|f| (f.path.as_path(), Some(f.template_name.as_str())))
            .collect::<Vec<_>>(),
    )
    .map_err(|e| LoaderError::Tera {
        dir: template_dir.to_path_buf(),
        source: e,
    })?;
    Ok(tera)
}

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("failed to load templates from {dir}")]
    Tera {
        dir: std::path::PathBuf,
        source: tera::Error,
    },
}
