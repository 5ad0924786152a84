use crate::error::Result;
use crate::restrictions::{
    select_restriction, EventRestriction, GuestPolicy, MemberLevel,
};
use crate::source_event::SourceEvent;
use serde_json::{json, Value};

/// Audience scope of a registration offering.
#[derive(Debug, Clone, PartialEq)]
pub enum Availability {
    Everyone,
    MembersOnly(Vec<MemberLevel>),
}

/// One registration type to submit to the destination for an event.
/// Identifier-less: the destination assigns the id on creation.
#[derive(Debug, Clone)]
pub struct RegistrationOffering {
    pub event_id: i64,
    pub name: String,
    pub price: f64,
    pub capacity: Option<u32>,
    pub capacity_label: &'static str,
    pub is_enabled: bool,
    pub description: String,
    pub availability: Availability,
    pub guest_policy: GuestPolicy,
    pub waitlist_enabled: bool,
}

impl RegistrationOffering {
    /// Capacity formatted for reporting.
    pub fn display_count(&self) -> String {
        match self.capacity {
            None => "unlimited".to_string(),
            Some(count) => format!("{} {}", count, self.capacity_label),
        }
    }

    /// The destination API's registration-type JSON payload.
    pub fn to_json(&self) -> Value {
        let mut payload = json!({
            "EventId": self.event_id,
            "Name": self.name,
            "IsEnabled": self.is_enabled,
            "Description": self.description,
            "BasePrice": self.price,
            "GuestPrice": self.price,
            "Availability": match self.availability {
                Availability::Everyone => "Everyone",
                Availability::MembersOnly(_) => "MembersOnly",
            },
            "MaximumRegistrantsCount": self.capacity,
            "GuestRegistrationPolicy": self.guest_policy.as_api_str(),
            "UnavailabilityPolicy": "ShowDisabled",
            "CancellationBehaviour": "AllowUpToPeriodBeforeEvent",
            "CancellationDaysBeforeEvent": 2,
            "IsWaitlistEnabled": self.waitlist_enabled,
        });
        if let Availability::MembersOnly(levels) = &self.availability {
            payload["AvailableForMembershipLevels"] = json!(levels);
        }
        payload
    }
}

/// Builds the two registration offerings submitted per event.
///
/// Capacity policy: the Meetup acknowledgement slot is sized to the
/// confirmed RSVP count, and the public slot's capacity is the event limit
/// minus those confirmed RSVPs (unlimited when the event has none).
pub struct RegistrationTypeMaker {
    restrictions: Vec<EventRestriction>,
}

impl RegistrationTypeMaker {
    pub fn new(restrictions: Vec<EventRestriction>) -> Self {
        RegistrationTypeMaker { restrictions }
    }

    /// Produce the (acknowledgement, public) offering pair for an event
    /// already created at the destination.
    pub fn make(
        &self,
        event: &SourceEvent,
        event_id: i64,
    ) -> Result<(RegistrationOffering, RegistrationOffering)> {
        let acknowledgement = self.make_meetup_rsvp(event_id, event.yes_rsvp_count);
        let capacity = event
            .rsvp_limit
            .map(|limit| limit.saturating_sub(event.yes_rsvp_count));
        let restriction = select_restriction(&self.restrictions, &event.title, event.fee)?;
        let public = self.make_public(event_id, capacity, event.fee, restriction);
        Ok((acknowledgement, public))
    }

    /// Disabled zero-price slot recording attendance already booked on
    /// Meetup.
    fn make_meetup_rsvp(&self, event_id: i64, rsvp_count: u32) -> RegistrationOffering {
        RegistrationOffering {
            event_id,
            name: "Meetup RSVP".to_string(),
            price: 0.0,
            capacity: Some(rsvp_count),
            capacity_label: "registered on Meetup",
            is_enabled: false,
            description: "RSVPs on Meetup".to_string(),
            availability: Availability::Everyone,
            guest_policy: GuestPolicy::Disabled,
            waitlist_enabled: false,
        }
    }

    fn make_public(
        &self,
        event_id: i64,
        capacity: Option<u32>,
        price: f64,
        restriction: &EventRestriction,
    ) -> RegistrationOffering {
        let availability = if restriction.member_levels.is_empty() {
            Availability::Everyone
        } else {
            Availability::MembersOnly(restriction.member_levels.clone())
        };
        RegistrationOffering {
            event_id,
            name: restriction.name.clone(),
            price,
            capacity,
            capacity_label: "available",
            is_enabled: true,
            description: String::new(),
            availability,
            guest_policy: restriction.guest_policy,
            waitlist_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restrictions::compile_pattern;
    use crate::source_event::RawSourceEvent;
    use serde_json::json;

    fn sample_levels() -> Vec<MemberLevel> {
        vec![
            MemberLevel { id: 111, url: "http://example.com/111".into() },
            MemberLevel { id: 222, url: "http://example.com/222".into() },
        ]
    }

    fn maker() -> RegistrationTypeMaker {
        let members_only = EventRestriction {
            name: "Members Only".into(),
            pattern: compile_pattern("members[ -]*only").unwrap(),
            match_free_events: true,
            match_paid_events: true,
            member_levels: sample_levels(),
            guest_policy: GuestPolicy::CollectContactDetails,
        };
        RegistrationTypeMaker::new(vec![members_only, EventRestriction::default_rule()])
    }

    fn event(name: &str, rsvp_limit: Option<u32>, yes_rsvp_count: u32, fee: f64) -> SourceEvent {
        let raw: RawSourceEvent = serde_json::from_value(json!({
            "id": "x1",
            "name": name,
            "time": 1604966400000i64,
            "rsvp_limit": rsvp_limit,
            "yes_rsvp_count": yes_rsvp_count,
            "fee": {"amount": fee},
        }))
        .unwrap();
        SourceEvent::from_raw(raw)
    }

    #[test]
    fn acknowledgement_slot_records_meetup_rsvps() {
        let (ack, _) = maker().make(&event("Mending Monday", Some(6), 3, 0.0), 12345).unwrap();
        assert_eq!(
            ack.to_json(),
            json!({
                "EventId": 12345,
                "Name": "Meetup RSVP",
                "IsEnabled": false,
                "Description": "RSVPs on Meetup",
                "BasePrice": 0.0,
                "GuestPrice": 0.0,
                "Availability": "Everyone",
                "MaximumRegistrantsCount": 3,
                "GuestRegistrationPolicy": "Disabled",
                "UnavailabilityPolicy": "ShowDisabled",
                "CancellationBehaviour": "AllowUpToPeriodBeforeEvent",
                "CancellationDaysBeforeEvent": 2,
                "IsWaitlistEnabled": false,
            })
        );
    }

    #[test]
    fn public_slot_reserves_confirmed_attendance() {
        let (_, public) = maker().make(&event("Mending Monday", Some(6), 2, 78.9), 12345).unwrap();
        assert_eq!(public.name, "RSVP");
        assert_eq!(public.capacity, Some(4));
        assert_eq!(public.price, 78.9);
        assert_eq!(public.availability, Availability::Everyone);
        assert!(public.waitlist_enabled);
    }

    #[test]
    fn unlimited_event_keeps_an_unlimited_public_slot() {
        let (_, public) = maker().make(&event("Mending Monday", None, 3, 0.0), 12345).unwrap();
        assert_eq!(public.capacity, None);
        assert_eq!(public.display_count(), "unlimited");
    }

    #[test]
    fn oversubscribed_event_saturates_at_zero() {
        let (_, public) = maker().make(&event("Mending Monday", Some(3), 5, 0.0), 12345).unwrap();
        assert_eq!(public.capacity, Some(0));
    }

    #[test]
    fn restricted_title_produces_a_members_only_slot() {
        let (_, public) = maker()
            .make(&event("Woodshop (Members Only)", Some(6), 0, 78.9), 12345)
            .unwrap();
        let payload = public.to_json();
        assert_eq!(payload["Name"], "Members Only");
        assert_eq!(payload["Availability"], "MembersOnly");
        assert_eq!(payload["GuestRegistrationPolicy"], "CollectContactDetails");
        assert_eq!(
            payload["AvailableForMembershipLevels"],
            json!([
                {"Id": 111, "Url": "http://example.com/111"},
                {"Id": 222, "Url": "http://example.com/222"},
            ])
        );
    }

    #[test]
    fn unrestricted_payload_omits_membership_levels() {
        let (_, public) = maker().make(&event("Mending Monday", None, 0, 0.0), 12345).unwrap();
        let payload = public.to_json();
        assert!(payload.get("AvailableForMembershipLevels").is_none());
        assert_eq!(payload["MaximumRegistrantsCount"], Value::Null);
    }

    #[test]
    fn display_count_formats_limited_capacity() {
        let (ack, _) = maker().make(&event("Mending Monday", Some(6), 3, 0.0), 12345).unwrap();
        assert_eq!(ack.display_count(), "3 registered on Meetup");
    }
}
