//! Sample triggers and provider payloads.

use crate::context::{CampaignIdentity, CampaignTrigger, MarketingParams};
use crate::core::RunStatus;
use serde_json::json;

/// Project id used by [`sample_trigger`].
pub const SAMPLE_PROJECT_ID: &str = "project-1";

/// A fresh campaign trigger for a discounted running shoe with two
/// reference images.
#[must_use]
pub fn sample_trigger() -> CampaignTrigger {
    CampaignTrigger::new(
        CampaignIdentity::new("user-1", SAMPLE_PROJECT_ID, "product-1"),
        MarketingParams {
            project_name: "Spring Launch".to_string(),
            product_name: "Trail Shoe".to_string(),
            description: "Lightweight trail running shoe with a grippy sole".to_string(),
            product_url: Some("https://shop.example.com/trail-shoe".to_string()),
            price: 120.0,
            discount: 20.0,
            target_audience: "urban runners aged 25-40".to_string(),
            output_format: "instagram post with a short video".to_string(),
            automate_campaign: Some(false),
        },
    )
    .with_image_ids(["img-1", "img-2"])
    .with_status(Some(RunStatus::NotStarted))
}

/// Renders a planner response holding the given instructions.
#[must_use]
pub fn planner_json(text: Option<&str>, image: Option<&str>, video: Option<&str>) -> String {
    json!({
        "text_prompt": text,
        "image_prompt": image,
        "video_prompt": video,
    })
    .to_string()
}

/// A few bytes starting with the JPEG magic number.
#[must_use]
pub fn sample_image_bytes() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F']
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::parse_instructions;

    #[test]
    fn test_planner_json_parses() {
        let instructions = parse_instructions(&planner_json(Some("copy"), None, Some(""))).unwrap();

        assert_eq!(instructions.text_prompt.as_deref(), Some("copy"));
        assert_eq!(instructions.image_prompt, None);
        assert_eq!(instructions.video_prompt, None);
    }
}
