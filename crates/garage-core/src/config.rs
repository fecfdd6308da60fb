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

pub const RC_ENV_VAR: &str = "GARAGERC";

const DEFAULTS: [(&str, &str); 6] = [
  ("data.location", "~/.taskgarage"),
  ("color", "on"),
  ("reminder.interval", "1"),
  ("search.debounce", "90"),
  ("confirm", "on"),
  ("notifications", "on")
];

#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      map:          DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
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
      info!(garagerc = %path.display(), "loading garagerc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no garagerc found; using \
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

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  /// `color` accepts on/off style
  /// values only.
  pub fn color(
    &self
  ) -> anyhow::Result<bool> {
    let raw = self
      .get("color")
      .unwrap_or_else(|| "on".to_string());
    match raw
      .to_ascii_lowercase()
      .as_str()
    {
      | "on" | "yes" | "true" | "1" => {
        Ok(true)
      }
      | "off" | "no" | "false" | "0" => {
        Ok(false)
      }
      | other => {
        Err(anyhow!(
          "invalid color setting: \
           {other}"
        ))
      }
    }
  }

  pub fn reminder_interval(
    &self
  ) -> anyhow::Result<Duration> {
    let secs =
      self.positive("reminder.interval")?;
    Ok(Duration::from_secs(secs))
  }

  pub fn search_debounce(
    &self
  ) -> anyhow::Result<Duration> {
    let raw = self
      .get("search.debounce")
      .unwrap_or_else(|| "90".to_string());
    let millis = raw
      .trim()
      .parse::<u64>()
      .with_context(|| {
        format!(
          "search.debounce must be a \
           number of milliseconds, got \
           `{raw}`"
        )
      })?;
    Ok(Duration::from_millis(millis))
  }

  pub fn timezone(
    &self
  ) -> Option<String> {
    self
      .get("timezone")
      .map(|tz| tz.trim().to_string())
      .filter(|tz| !tz.is_empty())
  }

  pub fn confirm(&self) -> bool {
    self
      .get_bool("confirm")
      .unwrap_or(true)
  }

  pub fn notifications(&self) -> bool {
    self
      .get_bool("notifications")
      .unwrap_or(true)
  }

  fn positive(
    &self,
    key: &str
  ) -> anyhow::Result<u64> {
    let raw = self
      .get(key)
      .ok_or_else(|| {
        anyhow!("missing {key}")
      })?;
    match raw.trim().parse::<u64>() {
      | Ok(value) if value > 0 => {
        Ok(value)
      }
      | _ => {
        Err(anyhow!(
          "{key} must be a positive \
           whole number, got `{raw}`"
        ))
      }
    }
  }

  #[tracing::instrument(skip(self))]
  pub fn load_file(
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
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
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
    std::env::var(RC_ENV_VAR)
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
       directory; skipping \
       ~/.garagerc"
    );
    return Ok(None);
  };
  let candidate = home.join(".garagerc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".taskgarage"))
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

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  #[test]
  fn defaults_cover_every_setting() {
    let cfg = Config::default();
    assert!(cfg.color().expect("color"));
    assert_eq!(
      cfg
        .reminder_interval()
        .expect("interval"),
      Duration::from_secs(1)
    );
    assert_eq!(
      cfg
        .search_debounce()
        .expect("debounce"),
      Duration::from_millis(90)
    );
    assert!(cfg.confirm());
    assert!(cfg.notifications());
    assert_eq!(cfg.timezone(), None);
  }

  #[test]
  fn rc_file_with_include_and_overrides()
  {
    let dir = tempfile::tempdir()
      .expect("tempdir");
    let extra = dir.path().join("extra.rc");
    fs::write(
      &extra,
      "timezone = Europe/Berlin\n"
    )
    .expect("write include");

    let main = dir.path().join("garagerc");
    let mut file = fs::File::create(&main)
      .expect("create rc");
    writeln!(
      file,
      "# comment\ncolor = off  # \
       trailing\ninclude extra.rc\n\
       reminder.interval = 5"
    )
    .expect("write rc");

    let mut cfg = Config::default();
    cfg.load_file(&main).expect("load");
    cfg.apply_overrides(vec![(
      "rc.confirm".to_string(),
      "off".to_string()
    )]);

    assert!(!cfg.color().expect("color"));
    assert_eq!(
      cfg.timezone().as_deref(),
      Some("Europe/Berlin")
    );
    assert_eq!(
      cfg
        .reminder_interval()
        .expect("interval"),
      Duration::from_secs(5)
    );
    assert!(!cfg.confirm());
    assert_eq!(cfg.loaded_files.len(), 2);
  }

  #[test]
  fn invalid_values_are_rejected() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![
      (
        "color".to_string(),
        "purple".to_string()
      ),
      (
        "reminder.interval".to_string(),
        "0".to_string()
      ),
    ]);
    assert!(cfg.color().is_err());
    assert!(
      cfg.reminder_interval().is_err()
    );
  }

  #[test]
  fn malformed_line_names_location() {
    let dir = tempfile::tempdir()
      .expect("tempdir");
    let path = dir.path().join("rc");
    fs::write(&path, "color on\n")
      .expect("write");
    let err = Config::default()
      .load_file(&path)
      .expect_err("malformed");
    assert!(
      err.to_string().contains(":1:")
    );
  }

  #[test]
  fn data_dir_is_created_on_demand() {
    let dir = tempfile::tempdir()
      .expect("tempdir");
    let target = dir.path().join("nested/data");
    let resolved = resolve_data_dir(
      &Config::default(),
      Some(&target)
    )
    .expect("resolve");
    assert_eq!(resolved, target);
    assert!(target.is_dir());
  }
}
