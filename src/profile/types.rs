use serde::{Deserialize, Serialize};

/// The user's stored answers. Every key is always present on the wire;
/// anything missing from a persisted record deserializes to its empty value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub personal_info: PersonalInfo,
    pub professional_info: ProfessionalInfo,
    pub resume: ResumeInfo,
    pub preferences: Preferences,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonalInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub age: String,
    pub gender: String,
    pub race: String,
    pub veteran_status: String,
    pub disability_status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfessionalInfo {
    pub experience: String,
    pub skills: Vec<String>,
    pub education: String,
    pub certifications: Vec<String>,
    pub work_authorization: bool,
    pub sponsorship_needed: bool,
    pub professional_license: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResumeInfo {
    pub file_path: String,
    pub file_name: String,
    pub upload_ready: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub auto_fill: bool,
    pub skip_optional: bool,
    pub confirm_before_submit: bool,
}

/// Profile slots a detected field can draw its answer from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProfileField {
    FirstName,
    LastName,
    Email,
    Phone,
    Address,
    City,
    State,
    PostalCode,
    Country,
    Age,
    Gender,
    Race,
    VeteranStatus,
    DisabilityStatus,
    Experience,
    Skills,
    Education,
    WorkAuthorization,
    SponsorshipNeeded,
    ProfessionalLicense,
    Resume,
}

/// A profile answer before it is rendered for a particular control.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileValue {
    Text(String),
    Bool(bool),
    /// Resume file name, present only when the resume is marked upload-ready.
    Upload(Option<String>),
}

impl UserProfile {
    /// The record used before anything has been saved.
    pub fn first_run() -> Self {
        Self {
            personal_info: PersonalInfo {
                country: "USA".into(),
                veteran_status: "Not a veteran".into(),
                disability_status: "No disability".into(),
                ..PersonalInfo::default()
            },
            professional_info: ProfessionalInfo {
                work_authorization: true,
                ..ProfessionalInfo::default()
            },
            resume: ResumeInfo::default(),
            preferences: Preferences {
                auto_fill: true,
                skip_optional: false,
                confirm_before_submit: true,
            },
        }
    }

    pub fn value_of(&self, field: ProfileField) -> ProfileValue {
        let p = &self.personal_info;
        let w = &self.professional_info;
        let text = |s: &str| ProfileValue::Text(s.to_string());
        match field {
            ProfileField::FirstName => text(&p.first_name),
            ProfileField::LastName => text(&p.last_name),
            ProfileField::Email => text(&p.email),
            ProfileField::Phone => text(&p.phone),
            ProfileField::Address => text(&p.address),
            ProfileField::City => text(&p.city),
            ProfileField::State => text(&p.state),
            ProfileField::PostalCode => text(&p.postal_code),
            ProfileField::Country => text(&p.country),
            ProfileField::Age => text(&p.age),
            ProfileField::Gender => text(&p.gender),
            ProfileField::Race => text(&p.race),
            ProfileField::VeteranStatus => text(&p.veteran_status),
            ProfileField::DisabilityStatus => text(&p.disability_status),
            ProfileField::Experience => text(&w.experience),
            ProfileField::Skills => ProfileValue::Text(w.skills.join(", ")),
            ProfileField::Education => text(&w.education),
            ProfileField::WorkAuthorization => ProfileValue::Bool(w.work_authorization),
            ProfileField::SponsorshipNeeded => ProfileValue::Bool(w.sponsorship_needed),
            ProfileField::ProfessionalLicense => ProfileValue::Bool(w.professional_license),
            ProfileField::Resume => ProfileValue::Upload(
                self.resume
                    .upload_ready
                    .then(|| self.resume.file_name.clone()),
            ),
        }
    }

    /// Replace whole top-level sections with those present in `patch`.
    /// Sections absent from the patch are kept; keys inside a replaced
    /// section that the patch omits fall back to their empty value.
    pub fn merge_sections(&self, patch: &serde_json::Value) -> serde_json::Result<Self> {
        let mut current = serde_json::to_value(self)?;
        if let (Some(target), Some(source)) = (current.as_object_mut(), patch.as_object()) {
            for (key, section) in source {
                if target.contains_key(key) {
                    target.insert(key.clone(), section.clone());
                }
            }
        }
        serde_json::from_value(current)
    }
}

/// Content-utility preferences. Stored as one record next to the profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub mode: String,
    pub auto_analyze: bool,
    pub notifications: bool,
    pub highlight_color: String,
    pub highlight_opacity: f32,
    /// Comma-separated extra keywords for highlighting.
    pub custom_keywords: String,
    pub ai_provider: String,
    pub model: String,
    pub data_collection: bool,
    pub last_updated: Option<chrono::DateTime<chrono::Utc>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: "basic".into(),
            auto_analyze: false,
            notifications: false,
            highlight_color: "#ffeb3b".into(),
            highlight_opacity: 0.8,
            custom_keywords: String::new(),
            ai_provider: "openai".into(),
            model: "gpt-3.5-turbo".into(),
            data_collection: false,
            last_updated: None,
        }
    }
}

impl Settings {
    pub fn custom_keywords(&self) -> Vec<String> {
        self.custom_keywords
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_deserialize_empty() {
        let profile: UserProfile =
            serde_json::from_str(r#"{"personalInfo":{"firstName":"Ada"}}"#).unwrap();
        assert_eq!(profile.personal_info.first_name, "Ada");
        assert_eq!(profile.personal_info.country, "");
        assert!(!profile.professional_info.work_authorization);
        assert!(profile.professional_info.skills.is_empty());

        let wire = serde_json::to_value(&profile).unwrap();
        assert!(wire["personalInfo"].get("veteranStatus").is_some());
        assert!(wire["resume"].get("uploadReady").is_some());
    }

    #[test]
    fn merge_replaces_sections_wholesale() {
        let base = UserProfile::first_run();
        let merged = base
            .merge_sections(&serde_json::json!({
                "personalInfo": {"firstName": "Grace", "email": "grace@example.com"},
                "unknownSection": {"x": 1}
            }))
            .unwrap();
        assert_eq!(merged.personal_info.first_name, "Grace");
        assert_eq!(merged.personal_info.country, "");
        assert_eq!(merged.professional_info, base.professional_info);
        assert_eq!(merged.preferences, base.preferences);
    }

    #[test]
    fn resume_value_depends_on_upload_ready() {
        let mut profile = UserProfile::default();
        profile.resume.file_name = "cv.pdf".into();
        assert_eq!(profile.value_of(ProfileField::Resume), ProfileValue::Upload(None));
        profile.resume.upload_ready = true;
        assert_eq!(
            profile.value_of(ProfileField::Resume),
            ProfileValue::Upload(Some("cv.pdf".into()))
        );
    }
}
