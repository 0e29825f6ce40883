//! Profile sub-resources — education, experience and skills.
//!
//! Each record is exclusively owned by one user. Mutations are always scoped
//! to the caller: stores must verify ownership before writing.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{
  Error, Result,
  user::{UserSummary, check_len},
};

// ─── Education ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Education {
  pub education_id:   Uuid,
  pub user_id:        Uuid,
  pub institution:    String,
  pub degree:         String,
  pub field_of_study: Option<String>,
  pub start_date:     NaiveDate,
  pub end_date:       Option<NaiveDate>,
  pub description:    Option<String>,
}

impl Education {
  pub fn validate(&self) -> Result<()> {
    required("institution", &self.institution, 200)?;
    required("degree", &self.degree, 200)?;
    check_len("field_of_study", self.field_of_study.as_deref(), 200)?;
    check_len("description", self.description.as_deref(), 2000)?;
    date_range(self.start_date, self.end_date)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEducation {
  pub institution:    String,
  pub degree:         String,
  pub field_of_study: Option<String>,
  pub start_date:     NaiveDate,
  pub end_date:       Option<NaiveDate>,
  pub description:    Option<String>,
}

impl NewEducation {
  /// Build the full record for `user_id`, validating it on the way.
  pub fn into_record(self, user_id: Uuid) -> Result<Education> {
    let record = Education {
      education_id:   Uuid::new_v4(),
      user_id,
      institution:    self.institution,
      degree:         self.degree,
      field_of_study: self.field_of_study,
      start_date:     self.start_date,
      end_date:       self.end_date,
      description:    self.description,
    };
    record.validate()?;
    Ok(record)
  }
}

/// Partial update for an [`Education`] record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EducationPatch {
  pub institution:    Option<String>,
  pub degree:         Option<String>,
  pub field_of_study: Option<String>,
  pub start_date:     Option<NaiveDate>,
  pub end_date:       Option<NaiveDate>,
  pub description:    Option<String>,
}

impl EducationPatch {
  /// Apply supplied fields and re-validate the result.
  pub fn apply(self, record: &mut Education) -> Result<()> {
    if let Some(v) = self.institution {
      record.institution = v;
    }
    if let Some(v) = self.degree {
      record.degree = v;
    }
    if let Some(v) = self.field_of_study {
      record.field_of_study = Some(v);
    }
    if let Some(v) = self.start_date {
      record.start_date = v;
    }
    if let Some(v) = self.end_date {
      record.end_date = Some(v);
    }
    if let Some(v) = self.description {
      record.description = Some(v);
    }
    record.validate()
  }
}

// ─── Experience ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experience {
  pub experience_id: Uuid,
  pub user_id:       Uuid,
  pub company:       String,
  pub title:         String,
  pub location:      Option<String>,
  pub start_date:    NaiveDate,
  pub end_date:      Option<NaiveDate>,
  pub description:   Option<String>,
}

impl Experience {
  pub fn validate(&self) -> Result<()> {
    required("company", &self.company, 200)?;
    required("title", &self.title, 200)?;
    check_len("location", self.location.as_deref(), 120)?;
    check_len("description", self.description.as_deref(), 2000)?;
    date_range(self.start_date, self.end_date)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewExperience {
  pub company:     String,
  pub title:       String,
  pub location:    Option<String>,
  pub start_date:  NaiveDate,
  pub end_date:    Option<NaiveDate>,
  pub description: Option<String>,
}

impl NewExperience {
  pub fn into_record(self, user_id: Uuid) -> Result<Experience> {
    let record = Experience {
      experience_id: Uuid::new_v4(),
      user_id,
      company:       self.company,
      title:         self.title,
      location:      self.location,
      start_date:    self.start_date,
      end_date:      self.end_date,
      description:   self.description,
    };
    record.validate()?;
    Ok(record)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExperiencePatch {
  pub company:     Option<String>,
  pub title:       Option<String>,
  pub location:    Option<String>,
  pub start_date:  Option<NaiveDate>,
  pub end_date:    Option<NaiveDate>,
  pub description: Option<String>,
}

impl ExperiencePatch {
  pub fn apply(self, record: &mut Experience) -> Result<()> {
    if let Some(v) = self.company {
      record.company = v;
    }
    if let Some(v) = self.title {
      record.title = v;
    }
    if let Some(v) = self.location {
      record.location = Some(v);
    }
    if let Some(v) = self.start_date {
      record.start_date = v;
    }
    if let Some(v) = self.end_date {
      record.end_date = Some(v);
    }
    if let Some(v) = self.description {
      record.description = Some(v);
    }
    record.validate()
  }
}

// ─── Skill ───────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Proficiency {
  Beginner,
  #[default]
  Intermediate,
  Advanced,
  Expert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
  pub skill_id:    Uuid,
  pub user_id:     Uuid,
  pub name:        String,
  pub proficiency: Proficiency,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSkill {
  pub name:        String,
  #[serde(default)]
  pub proficiency: Proficiency,
}

impl NewSkill {
  pub fn into_record(self, user_id: Uuid) -> Result<Skill> {
    let name = self.name.trim().to_owned();
    required("name", &name, 80)?;
    Ok(Skill {
      skill_id: Uuid::new_v4(),
      user_id,
      name,
      proficiency: self.proficiency,
    })
  }
}

// ─── Aggregate view ──────────────────────────────────────────────────────────

/// All sub-records owned by one user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileRecords {
  pub education:  Vec<Education>,
  pub experience: Vec<Experience>,
  pub skills:     Vec<Skill>,
}

/// The public profile: summary plus every owned record. Never stored, always
/// assembled on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileView {
  #[serde(flatten)]
  pub user:    UserSummary,
  pub bio:     Option<String>,
  #[serde(flatten)]
  pub records: ProfileRecords,
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn required(field: &str, value: &str, max: usize) -> Result<()> {
  if value.trim().is_empty() {
    return Err(Error::validation(format!("{field} must not be empty")));
  }
  check_len(field, Some(value), max)
}

fn date_range(start: NaiveDate, end: Option<NaiveDate>) -> Result<()> {
  match end {
    Some(end) if end < start => {
      Err(Error::validation("end_date must not precede start_date"))
    }
    _ => Ok(()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  fn new_education() -> NewEducation {
    NewEducation {
      institution:    "University of Indonesia".into(),
      degree:         "BSc".into(),
      field_of_study: Some("Computer Science".into()),
      start_date:     date(2015, 8, 1),
      end_date:       Some(date(2019, 6, 30)),
      description:    None,
    }
  }

  #[test]
  fn education_rejects_inverted_range() {
    let mut input = new_education();
    input.end_date = Some(date(2014, 1, 1));
    assert!(matches!(input.into_record(Uuid::new_v4()), Err(Error::Validation(_))));
  }

  #[test]
  fn education_patch_revalidates() {
    let mut record = new_education().into_record(Uuid::new_v4()).unwrap();
    let patch = EducationPatch { institution: Some("   ".into()), ..Default::default() };
    assert!(patch.apply(&mut record).is_err());
  }

  #[test]
  fn experience_patch_keeps_unsupplied_fields() {
    let mut record = NewExperience {
      company:     "Acme".into(),
      title:       "Engineer".into(),
      location:    Some("Jakarta".into()),
      start_date:  date(2020, 1, 1),
      end_date:    None,
      description: None,
    }
    .into_record(Uuid::new_v4())
    .unwrap();

    ExperiencePatch { title: Some("Staff Engineer".into()), ..Default::default() }
      .apply(&mut record)
      .unwrap();

    assert_eq!(record.title, "Staff Engineer");
    assert_eq!(record.company, "Acme");
    assert_eq!(record.location.as_deref(), Some("Jakarta"));
  }

  #[test]
  fn skill_name_is_trimmed_and_required() {
    let skill = NewSkill { name: "  Rust ".into(), proficiency: Proficiency::Expert }
      .into_record(Uuid::new_v4())
      .unwrap();
    assert_eq!(skill.name, "Rust");

    let empty = NewSkill { name: " ".into(), proficiency: Proficiency::Beginner };
    assert!(empty.into_record(Uuid::new_v4()).is_err());
  }
}
