//! Student profile and the three-step registration wizard.

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::format;
use crate::universities;

/// Upper bound of each achievement selector.
pub const MAX_ACHIEVEMENTS: u32 = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub name: String,
    /// University id from the directory, e.g. `unam`
    pub university: String,
    /// Faculty and career
    pub research_area: String,
    /// Enrollment number
    pub student_id: String,
    pub academic_achievements: u32,
    pub sports_achievements: u32,
    pub student_achievements: u32,
    /// Content reference of the uploaded ID document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_document: Option<String>,
}

impl StudentProfile {
    pub fn has_required_fields(&self) -> bool {
        [&self.name, &self.university, &self.research_area, &self.student_id]
            .iter()
            .all(|field| !field.trim().is_empty())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.has_required_fields() {
            return Err(ValidationError::MissingFields);
        }
        check_achievements(
            self.academic_achievements,
            self.sports_achievements,
            self.student_achievements,
        )
    }

    pub fn voting_power(&self) -> f64 {
        format::voting_power(
            self.academic_achievements,
            self.sports_achievements,
            self.student_achievements,
        )
    }
}

fn check_achievements(academic: u32, sports: u32, student: u32) -> Result<(), ValidationError> {
    if [academic, sports, student].iter().any(|n| *n > MAX_ACHIEVEMENTS) {
        return Err(ValidationError::AchievementOutOfRange { max: MAX_ACHIEVEMENTS });
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Wizard
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum WizardStep {
    University,
    PersonalInfo,
    Achievements,
}

/// Collects a [`StudentProfile`] one step at a time. Moving forward requires
/// the current step to be complete; moving back never loses input.
#[derive(Debug, Clone)]
pub struct RegistrationWizard {
    step: WizardStep,
    profile: StudentProfile,
}

impl Default for RegistrationWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrationWizard {
    pub fn new() -> Self {
        RegistrationWizard {
            step: WizardStep::University,
            profile: StudentProfile::default(),
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn profile(&self) -> &StudentProfile {
        &self.profile
    }

    pub fn select_university(&mut self, id: &str) -> Result<(), ValidationError> {
        let university =
            universities::by_id(id).ok_or_else(|| ValidationError::UnknownUniversity(id.to_string()))?;
        self.profile.university = university.id.to_string();
        Ok(())
    }

    pub fn set_personal_info(&mut self, name: &str, research_area: &str, student_id: &str) {
        self.profile.name = name.to_string();
        self.profile.research_area = research_area.to_string();
        self.profile.student_id = student_id.to_string();
    }

    pub fn attach_id_document(&mut self, reference: impl Into<String>) {
        self.profile.id_document = Some(reference.into());
    }

    pub fn set_achievements(&mut self, academic: u32, sports: u32, student: u32) -> Result<(), ValidationError> {
        check_achievements(academic, sports, student)?;
        self.profile.academic_achievements = academic;
        self.profile.sports_achievements = sports;
        self.profile.student_achievements = student;
        Ok(())
    }

    /// Voting power the current selection would earn.
    pub fn voting_power_preview(&self) -> f64 {
        self.profile.voting_power()
    }

    pub fn next(&mut self) -> Result<WizardStep, ValidationError> {
        self.step = match self.step {
            WizardStep::University if self.profile.university.is_empty() => {
                return Err(ValidationError::UniversityNotSelected)
            }
            WizardStep::University => WizardStep::PersonalInfo,
            WizardStep::PersonalInfo if !self.profile.has_required_fields() => {
                return Err(ValidationError::MissingFields)
            }
            WizardStep::PersonalInfo | WizardStep::Achievements => WizardStep::Achievements,
        };
        Ok(self.step)
    }

    pub fn back(&mut self) -> WizardStep {
        self.step = match self.step {
            WizardStep::University | WizardStep::PersonalInfo => WizardStep::University,
            WizardStep::Achievements => WizardStep::PersonalInfo,
        };
        self.step
    }

    /// The completed profile. Only available from the last step.
    pub fn finish(&self) -> Result<StudentProfile, ValidationError> {
        if self.step != WizardStep::Achievements {
            return Err(ValidationError::MissingFields);
        }
        self.profile.validate()?;
        Ok(self.profile.clone())
    }
}
