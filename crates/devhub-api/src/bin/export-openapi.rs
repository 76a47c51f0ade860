use std::{env, fs, path::Path};

use anyhow::{Context, Result};
use devhub_api::server::docs::ApiDoc;
use utoipa::OpenApi;

fn main() -> Result<()> {
    let openapi = ApiDoc::openapi();
    let yaml = openapi.to_yaml().context("failed to serialise OpenAPI")?;

    let Some(output) = env::args().nth(1) else {
        println!("{yaml}");
        return Ok(());
    };

    let path = Path::new(&output);
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory for {}", path.display()))?;
    }
    fs::write(path, yaml).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
