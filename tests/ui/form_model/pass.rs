use formwright::form::{FieldOptions, FormInstance, FormModel, FormOptions, Rule};
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize, formwright::form::FormModel)]
struct IntakeForm {
    email: String,
    #[serde(rename = "gpPractice")]
    gp_practice: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    allergies: Option<String>,
}

#[derive(Serialize, Deserialize, formwright::form::FormModel)]
#[serde(rename_all = "camelCase")]
struct Referral {
    date_of_birth: String,
    #[serde(rename = "nhs")]
    nhs_number: String,
    #[serde(skip)]
    draft_note: String,
}

#[derive(Serialize, formwright::form::FormModel)]
#[serde(rename_all(serialize = "kebab-case", deserialize = "snake_case"))]
struct Contact {
    phone_number: String,
}

fn main() {
    let referral = Referral::fields();
    assert_eq!(referral.date_of_birth().as_str(), "dateOfBirth");
    assert_eq!(referral.nhs_number().as_str(), "nhs");
    assert_eq!(Contact::fields().phone_number().as_str(), "phone-number");

    let form = FormInstance::from_model(
        &Referral {
            date_of_birth: "1990".to_string(),
            nhs_number: "943 476 5919".to_string(),
            draft_note: String::new(),
        },
        FormOptions::default(),
    )
    .expect("model serializes");
    assert_eq!(
        form.get_field_value(referral.date_of_birth()),
        Some(serde_json::json!("1990"))
    );

    let fields = IntakeForm::fields();
    assert_eq!(fields.email().as_str(), "email");
    assert_eq!(fields.gp_practice().as_str(), "gpPractice");
    assert_eq!(fields.allergies().as_str(), "allergies");

    let form = FormInstance::from_model(
        &IntakeForm {
            email: "a@b.com".to_string(),
            gp_practice: "Riverside".to_string(),
            allergies: None,
        },
        FormOptions::default(),
    )
    .expect("model serializes");
    let _field = form.register_field(FieldOptions::new(fields.email()).rule(Rule::required()));
    assert_eq!(
        form.get_field_value(fields.gp_practice()),
        Some(serde_json::json!("Riverside"))
    );
}
