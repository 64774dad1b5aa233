use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::schemas::{Item, ItemId, Person, PersonId};

/// Even split of an item's price. The caller guarantees at least one
/// participant.
pub fn per_person_share(item: &Item) -> f64 {
    item.price / item.participants.len() as f64
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemWithSplit {
    pub id: ItemId,
    pub name: String,
    pub price: f64,
    pub participants: Vec<PersonId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_by: Option<PersonId>,
    pub split_price: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonSummary {
    pub id: PersonId,
    pub name: String,
    pub items: Vec<ItemWithSplit>,
    pub total: f64,
    pub lent: f64,
    pub owes: f64,
    pub net_balance: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillLine {
    pub name: String,
    pub price: f64,
    pub total_price: f64,
    pub shared_with: usize,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PersonBill {
    pub name: String,
    pub items: Vec<BillLine>,
    pub total: f64,
}

/// Per-person bills keyed by person id. Serializes as a JSON object whose
/// keys keep people order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BillSummary(pub Vec<(PersonId, PersonBill)>);

impl BillSummary {
    pub fn get(&self, person_id: &str) -> Option<&PersonBill> {
        self.0
            .iter()
            .find(|(id, _)| id == person_id)
            .map(|(_, bill)| bill)
    }
}

impl From<Vec<(PersonId, PersonBill)>> for BillSummary {
    fn from(entries: Vec<(PersonId, PersonBill)>) -> Self {
        BillSummary(entries)
    }
}

impl Serialize for BillSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, bill) in &self.0 {
            map.serialize_entry(id, bill)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for BillSummary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = BillSummary;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of person id to bill")
            }

            fn visit_map<A>(self, mut access: A) -> Result<BillSummary, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry()? {
                    entries.push(entry);
                }
                Ok(BillSummary(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyStats {
    pub people: usize,
    pub items: usize,
    pub total: f64,
    pub average_per_person: Option<f64>,
}

/// A borrowed snapshot of the session that every derived figure is computed
/// from. Nothing is cached; each call rescans the items.
#[derive(Clone, Copy, Debug)]
pub struct Ledger<'a> {
    pub people: &'a [Person],
    pub items: &'a [Item],
}

impl<'a> Ledger<'a> {
    pub fn new(people: &'a [Person], items: &'a [Item]) -> Self {
        Ledger { people, items }
    }

    /// The item's payer, if it still names someone in the snapshot.
    fn payer_of<'i>(&self, item: &'i Item) -> Option<&'i str> {
        item.paid_by
            .as_deref()
            .filter(|payer| self.people.iter().any(|p| p.id == *payer))
    }

    fn items_of<'p>(&self, person_id: &'p str) -> impl Iterator<Item = &'a Item> + 'p
    where
        'a: 'p,
    {
        self.items
            .iter()
            .filter(move |item| item.has_participant(person_id))
    }

    /// What the person consumed, regardless of who paid.
    pub fn total_for_person(&self, person_id: &str) -> f64 {
        self.items_of(person_id).map(per_person_share).sum()
    }

    /// Shares of items someone else fronted.
    pub fn owed_for_person(&self, person_id: &str) -> f64 {
        self.items_of(person_id)
            .filter(|item| matches!(self.payer_of(item), Some(payer) if payer != person_id))
            .map(per_person_share)
            .sum()
    }

    /// The payer's outlay on behalf of the other participants.
    pub fn lent_by_person(&self, person_id: &str) -> f64 {
        self.items
            .iter()
            .filter(|item| self.payer_of(item) == Some(person_id))
            .map(|item| {
                let others = item
                    .participants
                    .iter()
                    .filter(|id| id.as_str() != person_id)
                    .count();
                per_person_share(item) * others as f64
            })
            .sum()
    }

    pub fn net_balance(&self, person_id: &str) -> f64 {
        self.lent_by_person(person_id) - self.owed_for_person(person_id)
    }

    pub fn person_items(&self, person_id: &str) -> Vec<ItemWithSplit> {
        self.items_of(person_id)
            .map(|item| ItemWithSplit {
                id: item.id.clone(),
                name: item.name.clone(),
                price: item.price,
                participants: item.participants.clone(),
                paid_by: item.paid_by.clone(),
                split_price: per_person_share(item),
            })
            .collect()
    }

    pub fn summarize(&self) -> Vec<PersonSummary> {
        self.people
            .iter()
            .map(|person| {
                PersonSummary {
                    id: person.id.clone(),
                    name: person.name.clone(),
                    items: self.person_items(&person.id),
                    total: self.total_for_person(&person.id),
                    lent: self.lent_by_person(&person.id),
                    owes: self.owed_for_person(&person.id),
                    net_balance: self.net_balance(&person.id),
                }
            })
            .collect()
    }

    pub fn total_bill(&self) -> f64 {
        self.items.iter().map(|item| item.price).sum()
    }

    pub fn bill_summary(&self) -> BillSummary {
        self.people
            .iter()
            .map(|person| {
                let items: Vec<BillLine> = self
                    .items_of(&person.id)
                    .map(|item| BillLine {
                        name: item.name.clone(),
                        price: per_person_share(item),
                        total_price: item.price,
                        shared_with: item.participants.len(),
                    })
                    .collect();
                let total: f64 = items.iter().map(|line| line.price).sum();
                let bill = PersonBill {
                    name: person.name.clone(),
                    items,
                    total,
                };
                (person.id.clone(), bill)
            })
            .collect::<Vec<_>>()
            .into()
    }

    pub fn party_stats(&self) -> PartyStats {
        let total = self.total_bill();
        PartyStats {
            people: self.people.len(),
            items: self.items.len(),
            total,
            average_per_person: (!self.people.is_empty())
                .then(|| total / self.people.len() as f64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPSILON: f64 = 1e-9;

    fn people(names: &[&str]) -> Vec<Person> {
        names
            .iter()
            .map(|name| Person {
                id: name.to_lowercase(),
                name: name.to_string(),
            })
            .collect()
    }

    fn item(name: &str, price: f64, participants: &[&str], paid_by: Option<&str>) -> Item {
        Item {
            id: name.to_lowercase(),
            name: name.to_string(),
            price,
            participants: participants.iter().map(|p| p.to_string()).collect(),
            paid_by: paid_by.map(str::to_string),
        }
    }

    #[test]
    fn pizza_splits_evenly_three_ways() {
        let people = people(&["Alice", "Bob", "Carol"]);
        let items = vec![item("Pizza", 300.0, &["alice", "bob", "carol"], None)];
        let ledger = Ledger::new(&people, &items);
        for person in &people {
            assert!((ledger.total_for_person(&person.id) - 100.0).abs() < EPSILON);
        }
        assert_eq!(ledger.total_bill(), 300.0);
    }

    #[test]
    fn coffee_paid_by_alice() {
        let people = people(&["Alice", "Bob"]);
        let items = vec![item("Coffee", 90.0, &["alice", "bob"], Some("alice"))];
        let ledger = Ledger::new(&people, &items);
        assert_eq!(ledger.owed_for_person("bob"), 45.0);
        assert_eq!(ledger.owed_for_person("alice"), 0.0);
        assert_eq!(ledger.lent_by_person("alice"), 45.0);
        assert_eq!(ledger.net_balance("alice"), 45.0);
        assert_eq!(ledger.net_balance("bob"), -45.0);
    }

    #[test]
    fn payer_outside_participants_lends_everything() {
        let people = people(&["Alice", "Bob", "Carol"]);
        let items = vec![item("Taxi", 120.0, &["bob", "carol"], Some("alice"))];
        let ledger = Ledger::new(&people, &items);
        assert_eq!(ledger.lent_by_person("alice"), 120.0);
        assert_eq!(ledger.total_for_person("alice"), 0.0);
        assert_eq!(ledger.owed_for_person("carol"), 60.0);
    }

    #[test]
    fn unpaid_items_carry_no_debt() {
        let people = people(&["Alice", "Bob"]);
        let items = vec![item("Snacks", 80.0, &["alice", "bob"], None)];
        let ledger = Ledger::new(&people, &items);
        assert_eq!(ledger.total_for_person("bob"), 40.0);
        assert_eq!(ledger.owed_for_person("bob"), 0.0);
        assert_eq!(ledger.lent_by_person("alice"), 0.0);
    }

    #[test]
    fn dangling_payer_counts_as_no_payer() {
        let people = people(&["Alice", "Bob"]);
        let items = vec![item("Dinner", 200.0, &["alice", "bob"], Some("ghost"))];
        let ledger = Ledger::new(&people, &items);
        assert_eq!(ledger.owed_for_person("alice"), 0.0);
        assert_eq!(ledger.owed_for_person("bob"), 0.0);
        assert_eq!(ledger.lent_by_person("ghost"), 0.0);
        assert_eq!(ledger.total_for_person("bob"), 100.0);
    }

    #[test]
    fn dangling_participant_still_divides_the_price() {
        let people = people(&["Alice"]);
        let items = vec![item("Cake", 90.0, &["alice", "ghost", "ghost2"], None)];
        let ledger = Ledger::new(&people, &items);
        let summary = ledger.summarize();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].total, 30.0);
    }

    #[test]
    fn summarize_preserves_people_order_and_itemizes() {
        let people = people(&["Carol", "Alice", "Bob"]);
        let items = vec![
            item("Coffee", 90.0, &["alice", "bob"], Some("alice")),
            item("Cake", 60.0, &["bob"], None),
        ];
        let summary = Ledger::new(&people, &items).summarize();
        let names: Vec<_> = summary.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Carol", "Alice", "Bob"]);

        assert!(summary[0].items.is_empty());
        assert_eq!(summary[0].total, 0.0);

        let bob = &summary[2];
        assert_eq!(bob.items.len(), 2);
        assert_eq!(bob.items[0].split_price, 45.0);
        assert_eq!(bob.items[1].split_price, 60.0);
        assert_eq!(bob.total, 105.0);
        assert_eq!(bob.owes, 45.0);
        assert_eq!(bob.net_balance, -45.0);
    }

    #[test]
    fn bill_summary_matches_export_shape() {
        let people = people(&["Alice", "Bob"]);
        let items = vec![item("Coffee", 90.0, &["alice", "bob"], None)];
        let bills = Ledger::new(&people, &items).bill_summary();
        assert_eq!(bills.0[0].0, "alice");
        let bob = bills.get("bob").unwrap();
        assert_eq!(
            bob.items,
            vec![BillLine {
                name: "Coffee".into(),
                price: 45.0,
                total_price: 90.0,
                shared_with: 2,
            }]
        );
        assert_eq!(bob.total, 45.0);

        let json = serde_json::to_string(&bills).unwrap();
        assert!(json.starts_with(r#"{"alice":{"name":"Alice""#));
        let back: BillSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bills);
    }

    #[test]
    fn party_stats_average() {
        let people = people(&["Alice", "Bob"]);
        let items = vec![item("Coffee", 90.0, &["alice", "bob"], None)];
        let stats = Ledger::new(&people, &items).party_stats();
        assert_eq!(stats.people, 2);
        assert_eq!(stats.items, 1);
        assert_eq!(stats.average_per_person, Some(45.0));
        assert_eq!(Ledger::new(&[], &[]).party_stats().average_per_person, None);
    }

    fn arb_ledger() -> impl Strategy<Value = (Vec<Person>, Vec<Item>)> {
        (1usize..=6).prop_flat_map(|count| {
            let item = (
                0.0f64..10_000.0,
                prop::collection::vec(any::<bool>(), count),
                0usize..=count,
                0usize..count,
            );
            prop::collection::vec(item, 0..=20).prop_map(move |raw| {
                let people: Vec<Person> = (0..count)
                    .map(|idx| Person {
                        id: format!("p{idx}"),
                        name: format!("Person {idx}"),
                    })
                    .collect();
                let items = raw
                    .into_iter()
                    .enumerate()
                    .map(|(idx, (price, mask, payer, fallback))| {
                        let mut participants: Vec<PersonId> = mask
                            .iter()
                            .enumerate()
                            .filter(|(_, on)| **on)
                            .map(|(p, _)| format!("p{p}"))
                            .collect();
                        if participants.is_empty() {
                            participants.push(format!("p{fallback}"));
                        }
                        Item {
                            id: format!("i{idx}"),
                            name: format!("Item {idx}"),
                            price,
                            participants,
                            // `payer == count` means nobody fronted it
                            paid_by: (payer < count).then(|| format!("p{payer}")),
                        }
                    })
                    .collect();
                (people, items)
            })
        })
    }

    proptest! {
        #[test]
        fn shares_multiply_back_to_price((_, items) in arb_ledger()) {
            for item in &items {
                let back = per_person_share(item) * item.participants.len() as f64;
                prop_assert!((back - item.price).abs() < EPSILON * item.price.max(1.0));
            }
        }

        #[test]
        fn totals_split_into_owed_and_own_payments((people, items) in arb_ledger()) {
            let ledger = Ledger::new(&people, &items);
            for person in &people {
                let own_paid: f64 = items
                    .iter()
                    .filter(|item| item.has_participant(&person.id))
                    .filter(|item| match item.paid_by.as_deref() {
                        None => true,
                        Some(payer) => payer == person.id,
                    })
                    .map(per_person_share)
                    .sum();
                let total = ledger.total_for_person(&person.id);
                let owed = ledger.owed_for_person(&person.id);
                prop_assert!((total - (owed + own_paid)).abs() < 1e-6);
            }
        }

        #[test]
        fn totals_sum_to_the_bill((people, items) in arb_ledger()) {
            let ledger = Ledger::new(&people, &items);
            let totals: f64 = people.iter().map(|p| ledger.total_for_person(&p.id)).sum();
            prop_assert!((totals - ledger.total_bill()).abs() < 1e-6);
        }

        #[test]
        fn net_balance_is_lent_minus_owed((people, items) in arb_ledger()) {
            let ledger = Ledger::new(&people, &items);
            for person in &people {
                prop_assert_eq!(
                    ledger.net_balance(&person.id),
                    ledger.lent_by_person(&person.id) - ledger.owed_for_person(&person.id)
                );
            }
        }

        #[test]
        fn net_balances_cancel_out((people, items) in arb_ledger()) {
            let ledger = Ledger::new(&people, &items);
            let net: f64 = people.iter().map(|p| ledger.net_balance(&p.id)).sum();
            prop_assert!(net.abs() < 1e-6);
        }
    }
}
