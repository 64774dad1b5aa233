use serde::{Deserialize, Serialize};

pub type PersonId = String;
pub type ItemId = String;

pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub price: f64,
    pub participants: Vec<PersonId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_by: Option<PersonId>,
}

impl Item {
    pub fn has_participant(&self, person_id: &str) -> bool {
        self.participants.iter().any(|id| id == person_id)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    #[default]
    Qrcode,
    Promptpay,
    Bank,
    Other,
}

impl PaymentType {
    pub fn label(self) -> &'static str {
        match self {
            PaymentType::Qrcode => "QR Code",
            PaymentType::Promptpay => "PromptPay",
            PaymentType::Bank => "Bank Account",
            PaymentType::Other => "อื่นๆ",
        }
    }
}

/// How the host wants to be paid back. `image` is usually a data URL.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct HostPaymentMethod {
    #[serde(rename = "type")]
    pub kind: PaymentType,
    pub image: Option<String>,
    pub details: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub people: Vec<Person>,
    pub items: Vec<Item>,
    pub host_id: Option<PersonId>,
    pub host_payment_method: HostPaymentMethod,
    pub first_time: bool,
}

impl Default for Session {
    fn default() -> Self {
        Session {
            people: vec![],
            items: vec![],
            host_id: None,
            host_payment_method: HostPaymentMethod::default(),
            first_time: true,
        }
    }
}

impl Session {
    pub fn person(&self, id: &str) -> Option<&Person> {
        self.people.iter().find(|p| p.id == id)
    }

    pub fn host(&self) -> Option<&Person> {
        self.host_id.as_deref().and_then(|id| self.person(id))
    }
}
