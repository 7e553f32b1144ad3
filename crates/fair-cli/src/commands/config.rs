use std::path::Path;

use anyhow::{Context, bail};
use fair_core::SimConfig;

/// Writes the default configuration to `path`.
pub fn init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let contents = SimConfig::default().to_toml_string()?;
    std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))?;
    println!("✓ Wrote {}", path.display());
    Ok(())
}

/// Prints the effective configuration.
pub fn show(path: Option<&Path>) -> anyhow::Result<()> {
    let config = match path {
        Some(path) => SimConfig::from_file(path)?,
        None => SimConfig::default(),
    };
    print!("{}", config.to_toml_string()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_a_loadable_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fairsim.toml");
        init(&path, false).unwrap();
        assert_eq!(SimConfig::from_file(&path).unwrap(), SimConfig::default());
    }

    #[test]
    fn init_refuses_to_clobber() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fairsim.toml");
        std::fs::write(&path, "# mine\n").unwrap();
        assert!(init(&path, false).is_err());
        init(&path, true).unwrap();
        assert!(SimConfig::from_file(&path).is_ok());
    }
}
