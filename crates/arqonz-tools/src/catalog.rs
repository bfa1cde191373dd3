//! Tool catalogue and payload building.

use std::str::FromStr;

use arqonz_core::{Error, Result};
use arqonz_jobs::{Attachment, JobPayload};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// AI image tool offered in the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolKind {
    #[serde(rename = "upscale-4k")]
    FourKUpscaler,
    RenderEnhancer,
    SketchToImage,
    StyleTransfer,
    ImagineAi,
    VirtualStaging,
    AiEraser,
    InpaintingAi,
    VideoAi,
    #[serde(rename = "interior")]
    InteriorAi,
    #[serde(rename = "exterior")]
    ExteriorAi,
}

/// Backend route a tool submits through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitRoute {
    /// `POST /mnml/run` with `tool` + JSON `payload` fields.
    Generic,
    /// `POST /generate-image` with flat expert fields.
    Expert,
    /// `POST {functions}/{slug}` with flat fields plus image and mask.
    Edge,
}

impl SubmitRoute {
    /// Path relative to the base URL the route posts to.
    pub fn path(self, tool: ToolKind) -> String {
        match self {
            Self::Generic => "/mnml/run".to_string(),
            Self::Expert => "/generate-image".to_string(),
            Self::Edge => format!("/{}", tool.slug()),
        }
    }
}

impl ToolKind {
    pub const ALL: [ToolKind; 11] = [
        ToolKind::FourKUpscaler,
        ToolKind::RenderEnhancer,
        ToolKind::SketchToImage,
        ToolKind::StyleTransfer,
        ToolKind::ImagineAi,
        ToolKind::VirtualStaging,
        ToolKind::AiEraser,
        ToolKind::InpaintingAi,
        ToolKind::VideoAi,
        ToolKind::InteriorAi,
        ToolKind::ExteriorAi,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Self::FourKUpscaler => "upscale-4k",
            Self::RenderEnhancer => "render-enhancer",
            Self::SketchToImage => "sketch-to-image",
            Self::StyleTransfer => "style-transfer",
            Self::ImagineAi => "imagine-ai",
            Self::VirtualStaging => "virtual-staging",
            Self::AiEraser => "ai-eraser",
            Self::InpaintingAi => "inpainting-ai",
            Self::VideoAi => "video-ai",
            Self::InteriorAi => "interior",
            Self::ExteriorAi => "exterior",
        }
    }

    /// Name shown to users and stored as the history `toolName`.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::FourKUpscaler => "4K Upscaler",
            Self::RenderEnhancer => "Render Enhancer",
            Self::SketchToImage => "Sketch to Image",
            Self::StyleTransfer => "Style Transfer",
            Self::ImagineAi => "Imagine AI",
            Self::VirtualStaging => "Virtual Staging",
            Self::AiEraser => "AI Eraser",
            Self::InpaintingAi => "Inpainting AI",
            Self::VideoAi => "Video AI",
            Self::InteriorAi => "Interior AI",
            Self::ExteriorAi => "Exterior AI",
        }
    }

    /// Imagine AI generates from text alone; every other tool transforms an
    /// uploaded image.
    pub fn requires_image(self) -> bool {
        !matches!(self, Self::ImagineAi)
    }

    /// Mask tools repaint the area marked by a second uploaded image.
    pub fn requires_mask(self) -> bool {
        matches!(self, Self::AiEraser | Self::InpaintingAi)
    }

    pub fn route(self) -> SubmitRoute {
        match self {
            Self::InteriorAi | Self::ExteriorAi => SubmitRoute::Expert,
            Self::AiEraser | Self::InpaintingAi => SubmitRoute::Edge,
            _ => SubmitRoute::Generic,
        }
    }

    pub fn info(self) -> ToolInfo {
        ToolInfo {
            slug: self.slug(),
            name: self.display_name(),
            requires_image: self.requires_image(),
            requires_mask: self.requires_mask(),
            route: self.route(),
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for ToolKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.slug() == s)
            .ok_or_else(|| Error::NotFound(format!("tool '{}'", s)))
    }
}

/// Public description of a tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub slug: &'static str,
    pub name: &'static str,
    #[serde(rename = "requiresImage")]
    pub requires_image: bool,
    #[serde(rename = "requiresMask")]
    pub requires_mask: bool,
    pub route: SubmitRoute,
}

/// Form input collected by a tool panel.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub tool: ToolKind,
    pub prompt: String,
    /// Tool-specific settings (seed, strength, lighting, scenario...).
    pub params: serde_json::Map<String, serde_json::Value>,
    pub image: Option<Attachment>,
    pub mask: Option<Attachment>,
    pub reference_image: Option<Attachment>,
}

impl ToolRequest {
    pub fn new(tool: ToolKind, prompt: impl Into<String>) -> Self {
        Self {
            tool,
            prompt: prompt.into(),
            params: serde_json::Map::new(),
            image: None,
            mask: None,
            reference_image: None,
        }
    }

    pub fn with_image(mut self, image: Attachment) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_mask(mut self, mask: Attachment) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Validate the form and build the job payload the gateway submits.
    pub fn into_payload(self) -> Result<JobPayload> {
        let prompt = self.prompt.trim().to_string();
        if self.tool.requires_image() && self.image.is_none() {
            return Err(Error::InvalidRequest(format!(
                "{} needs an uploaded image",
                self.tool.display_name()
            )));
        }
        if self.tool.requires_mask() && self.mask.is_none() {
            return Err(Error::InvalidRequest(format!(
                "{} needs a mask image",
                self.tool.display_name()
            )));
        }
        if !self.tool.requires_image() && prompt.is_empty() {
            return Err(Error::InvalidRequest(format!(
                "{} needs a prompt",
                self.tool.display_name()
            )));
        }

        let body = match self.tool.route() {
            SubmitRoute::Generic => {
                let mut payload = self.params.clone();
                if !prompt.is_empty() {
                    payload.insert("prompt".into(), json!(prompt));
                }
                json!({
                    "route": SubmitRoute::Generic,
                    "tool": self.tool.slug(),
                    "payload": payload,
                })
            }
            SubmitRoute::Expert => json!({
                "route": SubmitRoute::Expert,
                "tool": self.tool.slug(),
                "fields": self.expert_fields(&prompt),
            }),
            SubmitRoute::Edge => {
                let mut fields = self.params.clone();
                if !prompt.is_empty() {
                    fields.insert("prompt".into(), json!(prompt));
                }
                if self.tool == ToolKind::AiEraser {
                    fields
                        .entry("output_format")
                        .or_insert_with(|| json!("png"));
                }
                json!({
                    "route": SubmitRoute::Edge,
                    "tool": self.tool.slug(),
                    "fields": fields,
                })
            }
        };

        let mut payload = JobPayload::new(body).for_tool(self.tool.display_name());
        if !prompt.is_empty() {
            payload = payload.with_prompt(prompt);
        }
        if let Some(mut image) = self.image {
            image.field = "image".into();
            payload = payload.with_attachment(image);
        }
        if let Some(mut mask) = self.mask {
            mask.field = "mask".into();
            payload = payload.with_attachment(mask);
        }
        if let Some(mut reference) = self.reference_image {
            reference.field = "reference_image".into();
            payload = payload.with_attachment(reference);
        }
        Ok(payload)
    }

    fn expert_fields(&self, prompt: &str) -> serde_json::Value {
        let param = |key: &str| self.params.get(key).and_then(|v| v.as_str());
        let scene_mood = match param("lighting") {
            Some("evening") => "evening_lighting",
            _ => "auto_daylight",
        };
        let scenario = param("scenario").unwrap_or("precise");
        let expert = self.tool.slug();

        json!({
            "prompt": prompt,
            "expert_name": expert,
            "imagetype": "photo",
            "scene_mood": scene_mood,
            "camera_angle": "same_as_input",
            "render_style": "realistic",
            "render_scenario": scenario,
            "context": json!([expert]).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> Attachment {
        Attachment {
            field: String::new(),
            filename: "room.jpg".into(),
            content_type: Some("image/jpeg".into()),
            bytes: vec![0xff, 0xd8, 0xff],
        }
    }

    #[test]
    fn test_slug_roundtrip() {
        for tool in ToolKind::ALL {
            assert_eq!(tool.slug().parse::<ToolKind>().unwrap(), tool);
            assert_eq!(
                serde_json::to_value(tool).unwrap(),
                serde_json::json!(tool.slug())
            );
        }
        assert_eq!("video-ai".parse::<ToolKind>().unwrap(), ToolKind::VideoAi);
        assert!("floorplan-ai".parse::<ToolKind>().is_err());
    }

    #[test]
    fn test_routes() {
        assert_eq!(ToolKind::InteriorAi.route(), SubmitRoute::Expert);
        assert_eq!(
            ToolKind::ExteriorAi.route().path(ToolKind::ExteriorAi),
            "/generate-image"
        );
        assert_eq!(
            ToolKind::FourKUpscaler.route().path(ToolKind::FourKUpscaler),
            "/mnml/run"
        );
        assert_eq!(ToolKind::VideoAi.route(), SubmitRoute::Generic);
        assert_eq!(ToolKind::AiEraser.route(), SubmitRoute::Edge);
        assert_eq!(
            ToolKind::InpaintingAi.route().path(ToolKind::InpaintingAi),
            "/inpainting-ai"
        );
    }

    #[test]
    fn test_generic_payload() {
        let payload = ToolRequest::new(ToolKind::VirtualStaging, "  scandinavian living room ")
            .with_param("seed", json!(42))
            .with_image(image())
            .into_payload()
            .unwrap();

        assert_eq!(payload.body["tool"], "virtual-staging");
        assert_eq!(payload.body["route"], "generic");
        assert_eq!(payload.body["payload"]["prompt"], "scandinavian living room");
        assert_eq!(payload.body["payload"]["seed"], 42);
        assert_eq!(payload.tool_name.as_deref(), Some("Virtual Staging"));
        assert_eq!(payload.prompt.as_deref(), Some("scandinavian living room"));
        assert_eq!(payload.attachments.len(), 1);
        assert_eq!(payload.attachments[0].field, "image");
    }

    #[test]
    fn test_expert_payload() {
        let payload = ToolRequest::new(ToolKind::ExteriorAi, "brick facade")
            .with_param("lighting", json!("evening"))
            .with_param("scenario", json!("creative"))
            .with_image(image())
            .into_payload()
            .unwrap();

        let fields = &payload.body["fields"];
        assert_eq!(payload.body["route"], "expert");
        assert_eq!(fields["expert_name"], "exterior");
        assert_eq!(fields["scene_mood"], "evening_lighting");
        assert_eq!(fields["render_scenario"], "creative");
        assert_eq!(fields["context"], "[\"exterior\"]");
    }

    #[test]
    fn test_missing_image_rejected() {
        let err = ToolRequest::new(ToolKind::FourKUpscaler, "")
            .into_payload()
            .unwrap_err();
        assert!(err.to_string().contains("4K Upscaler"));
    }

    #[test]
    fn test_text_only_tool_needs_prompt() {
        assert!(ToolRequest::new(ToolKind::ImagineAi, "   ")
            .into_payload()
            .is_err());
        let payload = ToolRequest::new(ToolKind::ImagineAi, "glass pavilion")
            .into_payload()
            .unwrap();
        assert!(payload.attachments.is_empty());
    }

    fn mask() -> Attachment {
        Attachment {
            field: String::new(),
            filename: "mask.png".into(),
            content_type: Some("image/png".into()),
            bytes: vec![0x89, 0x50, 0x4e, 0x47],
        }
    }

    #[test]
    fn test_mask_tools_need_mask() {
        for tool in [ToolKind::AiEraser, ToolKind::InpaintingAi] {
            let err = ToolRequest::new(tool, "empty the corner")
                .with_image(image())
                .into_payload()
                .unwrap_err();
            assert!(err.to_string().contains("needs a mask image"));
        }
        assert!(!ToolKind::VirtualStaging.requires_mask());
    }

    #[test]
    fn test_eraser_payload_carries_mask() {
        let payload = ToolRequest::new(ToolKind::AiEraser, "")
            .with_image(image())
            .with_mask(mask())
            .into_payload()
            .unwrap();

        assert_eq!(payload.body["route"], "edge");
        assert_eq!(payload.body["tool"], "ai-eraser");
        assert_eq!(payload.body["fields"]["output_format"], "png");
        let fields: Vec<_> = payload.attachments.iter().map(|a| a.field.as_str()).collect();
        assert_eq!(fields, vec!["image", "mask"]);
        assert_eq!(payload.attachments[1].filename, "mask.png");
    }

    #[test]
    fn test_inpainting_payload() {
        let payload = ToolRequest::new(ToolKind::InpaintingAi, "marble kitchen island")
            .with_param("negative_prompt", json!("clutter"))
            .with_param("seed", json!(11))
            .with_image(image())
            .with_mask(mask())
            .into_payload()
            .unwrap();

        let fields = &payload.body["fields"];
        assert_eq!(fields["prompt"], "marble kitchen island");
        assert_eq!(fields["negative_prompt"], "clutter");
        assert_eq!(fields["seed"], 11);
        assert!(fields.get("output_format").is_none());
        assert_eq!(payload.tool_name.as_deref(), Some("Inpainting AI"));
    }
}
