use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    for (key, value) in [
      ("server.address", "127.0.0.1"),
      ("server.port", "8080"),
      ("server.timeout", "30"),
      ("default.command", "board"),
      ("color", "on")
    ] {
      map.insert(
        key.to_string(),
        value.to_string()
      );
    }
    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading taskdeckrc");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no taskdeckrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  /// `None` when unset; an error when set
  /// to something that is not a boolean.
  pub fn get_bool(
    &self,
    key: &str
  ) -> anyhow::Result<Option<bool>> {
    let Some(raw) = self.map.get(key)
    else {
      return Ok(None);
    };
    parse_bool(raw).map(Some).ok_or_else(
      || {
        anyhow!(
          "invalid {key} setting: {raw}"
        )
      }
    )
  }

  /// Task collection endpoint of the
  /// remote store.
  pub fn base_url(
    &self
  ) -> anyhow::Result<String> {
    let address = self
      .get("server.address")
      .map(|a| a.trim().to_string())
      .filter(|a| !a.is_empty())
      .ok_or_else(|| {
        anyhow!(
          "server.address is not set"
        )
      })?;
    let port = self
      .get("server.port")
      .unwrap_or_default();
    let port: u16 =
      port.trim().parse().with_context(
        || {
          format!(
            "invalid server.port: \
             {port:?}"
          )
        }
      )?;

    Ok(format!(
      "http://{address}:{port}/tasks/"
    ))
  }

  pub fn request_timeout(
    &self
  ) -> anyhow::Result<Duration> {
    let raw = self
      .get("server.timeout")
      .unwrap_or_else(|| "30".to_string());
    let secs: u64 =
      raw.trim().parse().with_context(
        || {
          format!(
            "invalid server.timeout: \
             {raw:?}"
          )
        }
      )?;
    if secs == 0 {
      return Err(anyhow!(
        "server.timeout must be at \
         least one second"
      ));
    }
    Ok(Duration::from_secs(secs))
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var("TASKDECKRC")
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory"
    );
    return Ok(None);
  };
  let candidate =
    home.join(".taskdeckrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::time::Duration;

  use super::Config;

  #[test]
  fn defaults_point_at_local_store() {
    let cfg = Config::default();
    assert_eq!(
      cfg.base_url().expect("url"),
      "http://127.0.0.1:8080/tasks/"
    );
    assert_eq!(
      cfg.request_timeout().expect("timeout"),
      Duration::from_secs(30)
    );
    assert_eq!(
      cfg.get_bool("color").expect("bool"),
      Some(true)
    );
    assert_eq!(
      cfg.get_bool("missing").expect("bool"),
      None
    );
  }

  #[test]
  fn file_includes_and_overrides() {
    let dir = tempfile::tempdir()
      .expect("tempdir");
    let extra = dir.path().join("extra.rc");
    fs::write(
      &extra,
      "server.port = 9000\n"
    )
    .expect("write include");
    let rc = dir.path().join("taskdeckrc");
    fs::write(
      &rc,
      "# remote store\n\
       server.address = 10.0.0.5 # lab box\n\
       include extra.rc\n"
    )
    .expect("write rc");

    let mut cfg = Config::load(Some(&rc))
      .expect("load");
    assert_eq!(cfg.loaded_files.len(), 2);
    assert_eq!(
      cfg.base_url().expect("url"),
      "http://10.0.0.5:9000/tasks/"
    );

    cfg.apply_overrides([(
      "rc.server.port".to_string(),
      "9100".to_string()
    )]);
    assert_eq!(
      cfg.base_url().expect("url"),
      "http://10.0.0.5:9100/tasks/"
    );
  }

  #[test]
  fn rejects_bad_values() {
    let mut cfg = Config::default();
    cfg.apply_overrides([
      (
        "server.port".to_string(),
        "http".to_string()
      ),
      (
        "server.timeout".to_string(),
        "0".to_string()
      )
    ]);
    assert!(cfg.base_url().is_err());
    assert!(cfg.request_timeout().is_err());
  }

  #[test]
  fn booleans_accept_both_spellings() {
    let mut cfg = Config::default();
    cfg.apply_overrides([(
      "color".to_string(),
      " OFF ".to_string()
    )]);
    assert_eq!(
      cfg.get_bool("color").expect("bool"),
      Some(false)
    );

    cfg.apply_overrides([(
      "color".to_string(),
      "sometimes".to_string()
    )]);
    assert!(cfg.get_bool("color").is_err());
  }

  #[test]
  fn malformed_line_is_an_error() {
    let dir = tempfile::tempdir()
      .expect("tempdir");
    let rc = dir.path().join("taskdeckrc");
    fs::write(&rc, "just words\n")
      .expect("write rc");
    assert!(Config::load(Some(&rc)).is_err());
  }
}
