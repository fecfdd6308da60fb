use chrono::{
  DateTime,
  Local,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeZone,
  Utc
};
use chrono_tz::Tz;

pub const TIMEZONE_ENV_VAR: &str =
  "GARAGE_TIMEZONE";

const DUE_DATE_FORMAT: &str =
  "%Y-%m-%d";

/// Resolves "today" and due-date
/// deadlines in the user's zone.
///
/// Without an explicit zone the system
/// local zone is used, which matches a
/// browser's local-date semantics.
#[derive(Debug, Clone, Copy, Default)]
pub struct Clock {
  zone: Option<Tz>
}

impl Clock {
  pub fn local() -> Self {
    Self {
      zone: None
    }
  }

  pub fn with_zone(zone: Tz) -> Self {
    Self {
      zone: Some(zone)
    }
  }

  /// Environment wins over the
  /// configured value. Unparsable
  /// zones fall back to local time.
  pub fn from_setting(
    configured: Option<&str>
  ) -> Self {
    if let Ok(raw) =
      std::env::var(TIMEZONE_ENV_VAR)
      && let Some(tz) = parse_timezone(
        &raw,
        TIMEZONE_ENV_VAR
      )
    {
      return Self::with_zone(tz);
    }

    if let Some(raw) = configured
      && let Some(tz) =
        parse_timezone(raw, "config")
    {
      return Self::with_zone(tz);
    }

    Self::local()
  }

  pub fn zone(&self) -> Option<Tz> {
    self.zone
  }

  pub fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }

  #[must_use]
  pub fn today(
    &self,
    now: DateTime<Utc>
  ) -> NaiveDate {
    match self.zone {
      | Some(tz) => {
        now.with_timezone(&tz).date_naive()
      }
      | None => {
        now.with_timezone(&Local)
          .date_naive()
      }
    }
  }

  /// The instant a due date lapses:
  /// 23:59:59 local on that date.
  pub fn end_of_day(
    &self,
    date: NaiveDate
  ) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::new(
      date,
      NaiveTime::from_hms_opt(
        23, 59, 59
      )?
    );
    match self.zone {
      | Some(tz) => {
        local_to_utc(&tz, naive)
      }
      | None => {
        local_to_utc(&Local, naive)
      }
    }
  }

  #[must_use]
  pub fn format_datetime(
    &self,
    dt: DateTime<Utc>
  ) -> String {
    const FORMAT: &str =
      "%b %-d, %Y, %H:%M:%S";
    match self.zone {
      | Some(tz) => dt
        .with_timezone(&tz)
        .format(FORMAT)
        .to_string(),
      | None => dt
        .with_timezone(&Local)
        .format(FORMAT)
        .to_string()
    }
  }
}

fn local_to_utc<Z: TimeZone>(
  zone: &Z,
  naive: NaiveDateTime
) -> Option<DateTime<Utc>> {
  let resolved = zone
    .from_local_datetime(&naive)
    .earliest();
  if resolved.is_none() {
    tracing::warn!(
      local = %naive,
      "local time does not exist in \
       zone; skipping deadline"
    );
  }
  resolved.map(|dt| {
    dt.with_timezone(&Utc)
  })
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id; \
         using local time"
      );
      None
    }
  }
}

/// Strict `YYYY-MM-DD`.
pub fn parse_due_date(
  raw: &str
) -> Option<NaiveDate> {
  let trimmed = raw.trim();
  if trimmed.len() != 10 {
    return None;
  }
  NaiveDate::parse_from_str(
    trimmed,
    DUE_DATE_FORMAT
  )
  .ok()
}

#[must_use]
pub fn format_due_iso(
  date: NaiveDate
) -> String {
  date.format(DUE_DATE_FORMAT).to_string()
}

/// Human label such as `Oct 18, 2026`.
#[must_use]
pub fn format_due_label(
  date: NaiveDate
) -> String {
  date.format("%b %-d, %Y").to_string()
}

pub fn format_iso_timestamp(
  dt: &DateTime<Utc>
) -> String {
  dt.to_rfc3339_opts(
    chrono::SecondsFormat::Millis,
    true
  )
}

pub fn parse_iso_timestamp(
  raw: &str
) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(
    raw.trim()
  )
  .ok()
  .map(|dt| dt.with_timezone(&Utc))
}

/// ISO-8601 UTC with millisecond
/// precision, e.g.
/// `2026-10-18T09:30:00.000Z`. The
/// fixed width keeps lexical and
/// chronological order identical.
pub mod iso_timestamp {
  use chrono::{
    DateTime,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &super::format_iso_timestamp(dt)
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_iso_timestamp(&raw)
      .ok_or_else(|| {
        serde::de::Error::custom(
          format!(
            "invalid timestamp: {raw}"
          )
        )
      })
  }

  pub mod option {
    use chrono::{
      DateTime,
      Utc
    };
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    pub fn serialize<S>(
      dt: &Option<DateTime<Utc>>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match dt {
        | Some(value) => serializer
          .serialize_str(
            &super::super::format_iso_timestamp(
              value
            )
          ),
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<DateTime<Utc>>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      let raw = Option::<String>::deserialize(
        deserializer
      )?;
      match raw {
        | None => Ok(None),
        | Some(raw) => super::super::parse_iso_timestamp(&raw)
          .map(Some)
          .ok_or_else(|| {
            serde::de::Error::custom(
              format!(
                "invalid timestamp: {raw}"
              )
            )
          })
      }
    }
  }
}
