use crate::event::ExtractedRecord;

/// The Kao tracking202 static postback endpoint. Query parameters are appended directly.
pub const KAO_POSTBACK_BASE_URL: &str = "https://www.kaotrk.com/tracking202/static/gpb.php?";

/// Renders postback URLs for extracted records against a fixed base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostbackFormatter {
    base_url: String,
}

impl PostbackFormatter {
    /// `base_url` is used verbatim as a prefix, so it must already end with `?`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_owned(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Produce `<base>amount=<amount>&subid=<client id>&t202txid=<lead uuid>`.
    pub fn format(&self, record: &ExtractedRecord) -> String {
        format!(
            "{}amount={}&subid={}&t202txid={}",
            self.base_url,
            record.payout_in_cents.to_amount(),
            record.client_id,
            record.lead_uuid
        )
    }

    pub fn format_all(&self, records: &[ExtractedRecord]) -> Vec<String> {
        records.iter().map(|record| self.format(record)).collect()
    }
}

impl Default for PostbackFormatter {
    fn default() -> Self {
        Self::new(KAO_POSTBACK_BASE_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_postback_url() {
        let formatter = PostbackFormatter::default();
        let record = ExtractedRecord::new(85, "8f4c2a9e-lead", "1503353-7871");

        assert_eq!(
            formatter.format(&record),
            "https://www.kaotrk.com/tracking202/static/gpb.php?amount=0.85&subid=1503353-7871&t202txid=8f4c2a9e-lead"
        );
    }

    #[test]
    fn test_amount_keeps_natural_decimal() {
        let formatter = PostbackFormatter::default();
        let url = formatter.format(&ExtractedRecord::new(8480, "lead", "7"));

        assert!(url.contains("amount=84.8&"));
        assert!(!url.contains("84.80"));
    }

    #[test]
    fn test_format_is_deterministic() {
        let formatter = PostbackFormatter::new("http://localhost:8080/postback?");
        let record = ExtractedRecord::new(1999, "lead", "12");

        assert_eq!(formatter.format(&record), formatter.format(&record));
        assert_eq!(
            formatter.format(&record),
            "http://localhost:8080/postback?amount=19.99&subid=12&t202txid=lead"
        );
    }

    #[test]
    fn test_format_all_preserves_order() {
        let formatter = PostbackFormatter::default();
        let records = vec![
            ExtractedRecord::new(100, "first", "1"),
            ExtractedRecord::new(200, "second", "2"),
        ];

        let urls = formatter.format_all(&records);

        assert_eq!(urls.len(), 2);
        assert!(urls[0].ends_with("t202txid=first"));
        assert!(urls[1].ends_with("t202txid=second"));
    }
}
