use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SessionError;
use crate::schemas::{generate_id, HostPaymentMethod, Item, Person, PersonId, Session};

type Result<T> = std::result::Result<T, SessionError>;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemInput {
    pub name: String,
    pub price: f64,
    pub participants: Vec<PersonId>,
    #[serde(default)]
    pub paid_by: Option<PersonId>,
}

/// Everything a person deletion touched.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonRemoval {
    pub person: Person,
    pub removed_items: Vec<Item>,
    pub host_cleared: bool,
}

fn clean_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SessionError::EmptyName);
    }
    Ok(name.to_string())
}

impl Session {
    fn require_person(&self, id: &str) -> Result<()> {
        match self.person(id) {
            Some(_) => Ok(()),
            None => Err(SessionError::PersonNotFound(id.to_string())),
        }
    }

    /// Validates an item form and returns `(name, participants)` ready to store.
    fn validate_item(&self, input: &ItemInput) -> Result<(String, Vec<PersonId>)> {
        let name = clean_name(&input.name)?;
        if !input.price.is_finite() || input.price < 0.0 {
            return Err(SessionError::InvalidPrice(input.price));
        }
        let mut participants: Vec<PersonId> = Vec::with_capacity(input.participants.len());
        for id in &input.participants {
            self.require_person(id)?;
            if !participants.contains(id) {
                participants.push(id.clone());
            }
        }
        if participants.is_empty() {
            return Err(SessionError::NoParticipants);
        }
        if let Some(payer) = &input.paid_by {
            self.require_person(payer)?;
        }
        Ok((name, participants))
    }

    pub fn add_person(&mut self, name: &str) -> Result<Person> {
        let person = Person {
            id: generate_id(),
            name: clean_name(name)?,
        };
        self.people.push(person.clone());
        self.first_time = false;
        info!(person_id = %person.id, "person added");
        Ok(person)
    }

    pub fn rename_person(&mut self, id: &str, name: &str) -> Result<Person> {
        let name = clean_name(name)?;
        let person = self
            .people
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| SessionError::PersonNotFound(id.to_string()))?;
        person.name = name;
        Ok(person.clone())
    }

    /// Removes a person together with every reference to them: participant
    /// slots, items left without participants, the host pointer and any
    /// `paid_by` on the surviving items.
    pub fn delete_person(&mut self, id: &str) -> Result<PersonRemoval> {
        let index = self
            .people
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| SessionError::PersonNotFound(id.to_string()))?;
        let person = self.people.remove(index);

        let mut removed_items = Vec::new();
        let mut kept = Vec::with_capacity(self.items.len());
        for mut item in self.items.drain(..) {
            item.participants.retain(|pid| pid != id);
            if item.participants.is_empty() {
                removed_items.push(item);
                continue;
            }
            if item.paid_by.as_deref() == Some(id) {
                item.paid_by = None;
            }
            kept.push(item);
        }
        self.items = kept;

        let host_cleared = self.host_id.as_deref() == Some(id);
        if host_cleared {
            self.host_id = None;
        }

        info!(
            person_id = %person.id,
            removed_items = removed_items.len(),
            host_cleared,
            "person deleted"
        );
        Ok(PersonRemoval {
            person,
            removed_items,
            host_cleared,
        })
    }

    pub fn add_item(&mut self, input: &ItemInput) -> Result<Item> {
        let (name, participants) = self.validate_item(input)?;
        let item = Item {
            id: generate_id(),
            name,
            price: input.price,
            participants,
            paid_by: input.paid_by.clone(),
        };
        self.items.push(item.clone());
        info!(item_id = %item.id, price = item.price, "item added");
        Ok(item)
    }

    /// Replaces every field of an item except its id.
    pub fn edit_item(&mut self, id: &str, input: &ItemInput) -> Result<Item> {
        let (name, participants) = self.validate_item(input)?;
        let item = self
            .items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| SessionError::ItemNotFound(id.to_string()))?;
        item.name = name;
        item.price = input.price;
        item.participants = participants;
        item.paid_by = input.paid_by.clone();
        debug!(item_id = %item.id, "item edited");
        Ok(item.clone())
    }

    pub fn delete_item(&mut self, id: &str) -> Result<Item> {
        let index = self
            .items
            .iter()
            .position(|item| item.id == id)
            .ok_or_else(|| SessionError::ItemNotFound(id.to_string()))?;
        Ok(self.items.remove(index))
    }

    pub fn set_host(&mut self, id: Option<&str>) -> Result<()> {
        if let Some(id) = id {
            self.require_person(id)?;
        }
        self.host_id = id.map(str::to_string);
        Ok(())
    }

    pub fn set_payment_method(&mut self, method: HostPaymentMethod) {
        self.host_payment_method = method;
    }

    pub fn complete_onboarding(&mut self) {
        self.first_time = false;
    }

    pub fn clear_items(&mut self) {
        self.items.clear();
    }

    pub fn clear_people(&mut self) {
        self.people.clear();
        self.items.clear();
        self.host_id = None;
    }

    /// Resets everything except the onboarding flag.
    pub fn clear_all(&mut self) {
        self.clear_people();
        self.host_payment_method = HostPaymentMethod::default();
        info!("session cleared");
    }
}
