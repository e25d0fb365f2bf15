//! Semantic field names, the selectors that recognise them, and the profile
//! slot each one is answered from. Entry order is claim order: an element
//! matched by an earlier entry is not claimed again.

use std::sync::OnceLock;

use crate::dom::Selector;
use crate::profile::ProfileField;

pub struct TaxonomyEntry {
    pub name: &'static str,
    pub selectors: &'static [&'static str],
    pub source: ProfileField,
}

pub const TAXONOMY: &[TaxonomyEntry] = &[
    TaxonomyEntry {
        name: "firstName",
        selectors: &[
            r#"input[name*="first"]"#,
            r#"input[id*="first"]"#,
            r#"input[placeholder*="first"]"#,
            r#"input[name="firstName"]"#,
            r#"input[id="firstName"]"#,
            r#"input[name="first_name"]"#,
        ],
        source: ProfileField::FirstName,
    },
    TaxonomyEntry {
        name: "lastName",
        selectors: &[
            r#"input[name*="last"]"#,
            r#"input[id*="last"]"#,
            r#"input[placeholder*="last"]"#,
            r#"input[name="lastName"]"#,
            r#"input[id="lastName"]"#,
            r#"input[name="last_name"]"#,
        ],
        source: ProfileField::LastName,
    },
    TaxonomyEntry {
        name: "email",
        selectors: &[
            r#"input[type="email"]"#,
            r#"input[name*="email"]"#,
            r#"input[id*="email"]"#,
        ],
        source: ProfileField::Email,
    },
    TaxonomyEntry {
        name: "phone",
        selectors: &[
            r#"input[type="tel"]"#,
            r#"input[name*="phone"]"#,
            r#"input[id*="phone"]"#,
        ],
        source: ProfileField::Phone,
    },
    TaxonomyEntry {
        name: "address",
        selectors: &[
            r#"input[name*="address"]"#,
            r#"input[id*="address"]"#,
            r#"textarea[name*="address"]"#,
        ],
        source: ProfileField::Address,
    },
    TaxonomyEntry {
        name: "city",
        selectors: &[r#"input[name*="city"]"#, r#"input[id*="city"]"#],
        source: ProfileField::City,
    },
    TaxonomyEntry {
        name: "state",
        selectors: &[
            r#"select[name*="state"]"#,
            r#"input[name*="state"]"#,
            r#"input[id*="state"]"#,
        ],
        source: ProfileField::State,
    },
    TaxonomyEntry {
        name: "postalCode",
        selectors: &[
            r#"input[name*="zip"]"#,
            r#"input[name*="postal"]"#,
            r#"input[id*="zip"]"#,
            r#"input[id*="postal"]"#,
        ],
        source: ProfileField::PostalCode,
    },
    TaxonomyEntry {
        name: "country",
        selectors: &[r#"select[name*="country"]"#, r#"input[name*="country"]"#],
        source: ProfileField::Country,
    },
    TaxonomyEntry {
        name: "age",
        selectors: &[
            r#"input[name*="age"]"#,
            r#"input[id*="age"]"#,
            r#"input[type="number"]"#,
        ],
        source: ProfileField::Age,
    },
    TaxonomyEntry {
        name: "experience",
        selectors: &[
            r#"input[name*="experience"]"#,
            r#"select[name*="experience"]"#,
            r#"input[id*="experience"]"#,
        ],
        source: ProfileField::Experience,
    },
    TaxonomyEntry {
        name: "skills",
        selectors: &[
            r#"textarea[name*="skill"]"#,
            r#"input[name*="skill"]"#,
            r#"textarea[id*="skill"]"#,
        ],
        source: ProfileField::Skills,
    },
    TaxonomyEntry {
        name: "education",
        selectors: &[
            r#"textarea[name*="education"]"#,
            r#"input[name*="education"]"#,
            r#"textarea[id*="education"]"#,
        ],
        source: ProfileField::Education,
    },
    TaxonomyEntry {
        name: "workAuthorization",
        selectors: &[
            r#"input[name*="authorized"]"#,
            r#"select[name*="authorized"]"#,
            r#"input[id*="authorized"]"#,
            r#"input[name="workAuthorization"]"#,
            r#"select[name="workAuthorization"]"#,
        ],
        source: ProfileField::WorkAuthorization,
    },
    TaxonomyEntry {
        name: "sponsorship",
        selectors: &[
            r#"input[name*="sponsor"]"#,
            r#"select[name*="sponsor"]"#,
            r#"input[id*="sponsor"]"#,
        ],
        source: ProfileField::SponsorshipNeeded,
    },
    TaxonomyEntry {
        name: "license",
        selectors: &[
            r#"input[name*="license"]"#,
            r#"select[name*="license"]"#,
            r#"input[id*="license"]"#,
        ],
        source: ProfileField::ProfessionalLicense,
    },
    TaxonomyEntry {
        name: "resume",
        selectors: &[
            r#"input[type="file"]"#,
            r#"input[name*="resume"]"#,
            r#"input[id*="resume"]"#,
            r#"input[name*="cv"]"#,
            r#"input[id*="cv"]"#,
        ],
        source: ProfileField::Resume,
    },
    TaxonomyEntry {
        name: "gender",
        selectors: &[r#"select[name*="gender"]"#, r#"input[name*="gender"]"#],
        source: ProfileField::Gender,
    },
    TaxonomyEntry {
        name: "race",
        selectors: &[r#"select[name*="race"]"#, r#"input[name*="race"]"#],
        source: ProfileField::Race,
    },
    TaxonomyEntry {
        name: "veteran",
        selectors: &[
            r#"select[name*="veteran"]"#,
            r#"input[name*="veteran"]"#,
        ],
        source: ProfileField::VeteranStatus,
    },
    TaxonomyEntry {
        name: "disability",
        selectors: &[
            r#"select[name*="disability"]"#,
            r#"input[name*="disability"]"#,
        ],
        source: ProfileField::DisabilityStatus,
    },
];

/// Fields whose presence marks a job application.
pub fn is_job_application_field(field: ProfileField) -> bool {
    matches!(
        field,
        ProfileField::Resume
            | ProfileField::WorkAuthorization
            | ProfileField::SponsorshipNeeded
            | ProfileField::ProfessionalLicense
    )
}

pub struct CompiledEntry {
    pub entry: &'static TaxonomyEntry,
    pub selectors: Vec<(&'static str, Selector)>,
}

/// Taxonomy with every selector parsed once per process.
pub fn compiled() -> &'static [CompiledEntry] {
    static COMPILED: OnceLock<Vec<CompiledEntry>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        TAXONOMY
            .iter()
            .map(|entry| CompiledEntry {
                entry,
                selectors: entry
                    .selectors
                    .iter()
                    .filter_map(|&s| match Selector::parse(s) {
                        Ok(sel) => Some((s, sel)),
                        Err(e) => {
                            tracing::error!(selector = s, error = %e, "taxonomy selector rejected");
                            None
                        }
                    })
                    .collect(),
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_selector_parses() {
        for entry in TAXONOMY {
            for s in entry.selectors {
                assert!(Selector::parse(s).is_ok(), "{} / {s}", entry.name);
            }
        }
        let total: usize = TAXONOMY.iter().map(|e| e.selectors.len()).sum();
        let compiled_total: usize = compiled().iter().map(|c| c.selectors.len()).sum();
        assert_eq!(total, compiled_total);
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<_> = TAXONOMY.iter().map(|e| e.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), TAXONOMY.len());
    }
}
