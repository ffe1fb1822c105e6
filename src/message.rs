//! Alert message composition and channel deep links.
//!
//! The message is built once per dispatch and reused for every contact; the
//! location is never re-resolved per recipient.

use url::Url;

use crate::model::{LocationFix, PhoneNumber};

/// Shareable map link for a fix: `https://maps.google.com/?q=<lat>,<lon>`.
#[must_use]
pub fn map_url(fix: &LocationFix) -> Url {
    let raw = format!(
        "https://maps.google.com/?q={},{}",
        fix.coordinate.lat(),
        fix.coordinate.lon()
    );
    Url::parse(&raw).expect("coordinates are validated finite numbers")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    body: String,
    map_url: Url,
}

impl AlertMessage {
    #[must_use]
    pub fn compose(fix: &LocationFix) -> Self {
        let map_url = map_url(fix);
        let body = format!(
            "\u{1f6a8} EMERGENCY SOS ALERT!\nI need immediate help!\nMy location: {map_url}"
        );
        Self { body, map_url }
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    #[must_use]
    pub fn map_url(&self) -> &Url {
        &self.map_url
    }
}

/// `whatsapp://send?phone=<digits>&text=<encoded>`.
#[must_use]
pub fn whatsapp_url(phone: &PhoneNumber, body: &str) -> Url {
    let mut url = Url::parse("whatsapp://send").expect("static scheme");
    url.query_pairs_mut()
        .append_pair("phone", &phone.digits())
        .append_pair("text", body);
    url
}

/// Web fallback when the `whatsapp://` scheme has no handler.
#[must_use]
pub fn wa_me_url(phone: &PhoneNumber, body: &str) -> Url {
    let mut url = Url::parse(&format!("https://wa.me/{}", phone.digits()))
        .expect("digits form a valid path");
    url.query_pairs_mut().append_pair("text", body);
    url
}

/// `sms:` deep link, the fallback when the SMS composer is unavailable.
#[must_use]
pub fn sms_url(phone: &PhoneNumber, body: &str) -> Url {
    let mut url = Url::parse(&format!("sms:{}", phone.digits()))
        .expect("digits form a valid path");
    url.query_pairs_mut().append_pair("body", body);
    url
}

/// `mailto:` deep link. Fails on addresses that do not form a valid URL;
/// the dispatcher records that as a per-channel failure.
pub fn mailto_url(email: &str, body: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&format!("mailto:{email}"))?;
    url.query_pairs_mut()
        .append_pair("subject", "EMERGENCY SOS ALERT")
        .append_pair("body", body);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Coordinate, LocationFix};

    fn fix(lat: f64, lon: f64) -> LocationFix {
        LocationFix::new(Coordinate::new(lat, lon).unwrap())
    }

    #[test]
    fn map_url_matches_expected_shape() {
        let url = map_url(&fix(37.7749, -122.4194));
        assert_eq!(url.as_str(), "https://maps.google.com/?q=37.7749,-122.4194");
    }

    #[test]
    fn message_embeds_map_link_once() {
        let message = AlertMessage::compose(&fix(10.5, 20.25));
        assert!(message.body().contains("EMERGENCY SOS ALERT"));
        assert!(message.body().contains("https://maps.google.com/?q=10.5,20.25"));
        assert_eq!(message.map_url().as_str(), "https://maps.google.com/?q=10.5,20.25");
    }

    #[test]
    fn whatsapp_url_uses_digits_and_encodes_text() {
        let phone = PhoneNumber::new("+1 (555) 010-9999").unwrap();
        let url = whatsapp_url(&phone, "help me\nnow");

        assert_eq!(url.scheme(), "whatsapp");
        let query = url.query().unwrap();
        assert!(query.contains("phone=15550109999"));
        assert!(!query.contains('\n'));
    }

    #[test]
    fn sms_url_targets_digits() {
        let phone = PhoneNumber::new("555-010-9999").unwrap();
        let url = sms_url(&phone, "help");
        assert_eq!(url.scheme(), "sms");
        assert_eq!(url.path(), "5550109999");
        assert!(url.query().unwrap().starts_with("body="));
    }

    #[test]
    fn wa_me_url_is_https() {
        let phone = PhoneNumber::new("5550109999").unwrap();
        let url = wa_me_url(&phone, "help");
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("wa.me"));
    }

    #[test]
    fn mailto_rejects_unparseable_address() {
        assert!(mailto_url("not an email at all ://", "x").is_err());
        assert!(mailto_url("sos@example.com", "x").is_ok());
    }
}
