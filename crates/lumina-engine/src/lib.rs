use std::env;
use std::io::Cursor;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{ImageFormat, Rgb, RgbImage};
use lumina_contracts::brand::{
    AspectRatio, AssetState, BrandConcept, BrandInput, ImageSize, MockupKind, Project,
    ProjectStatus,
};
use lumina_contracts::events::{EventPayload, EventWriter};
use lumina_contracts::projects::{push_version, visible_history, ConceptPatch, ProjectStore};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

pub const TEXT_MODEL: &str = "gemini-2.5-flash";
pub const PRIMARY_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
pub const FALLBACK_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

pub const IMAGE_TIMEOUT: Duration = Duration::from_secs(60);
const TEXT_TIMEOUT: Duration = Duration::from_secs(90);

const MIN_REFERENCE_PAYLOAD_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct TextRequest {
    pub model: String,
    pub prompt: String,
    pub system_instruction: String,
    pub response_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    InlineImage { mime_type: String, data: String },
    Text(String),
}

#[derive(Debug, Clone, Copy)]
pub struct ImageConfig {
    pub image_size: ImageSize,
    pub aspect_ratio: AspectRatio,
}

#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub model: String,
    pub parts: Vec<ContentPart>,
    pub image_config: Option<ImageConfig>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResponse {
    pub parts: Vec<ContentPart>,
}

pub trait TextCapability: Send + Sync {
    fn name(&self) -> &str;
    fn generate_text(&self, request: &TextRequest) -> Result<String>;
}

pub trait ImageCapability: Send + Sync {
    fn name(&self) -> &str;
    fn generate_image(&self, request: &ImageRequest) -> Result<ImageResponse>;
}

#[derive(Clone)]
pub struct GeminiClient {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: env::var("LUMINA_API_BASE")
                .ok()
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            api_key: api_key.into(),
            http: HttpClient::new(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let Some(api_key) = non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"))
        else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        Ok(Self::new(api_key))
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn post(&self, model: &str, payload: &Value, timeout: Duration) -> Result<Value> {
        let endpoint = self.endpoint_for_model(model);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .timeout(timeout)
            .json(payload)
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    anyhow::anyhow!(
                        "request to {model} timed out after {}s",
                        timeout.as_secs()
                    )
                } else {
                    anyhow::Error::new(err).context(format!("request to {model} failed"))
                }
            })?;

        let status = response.status();
        let code = status.as_u16();
        let body = response
            .text()
            .with_context(|| format!("{model} response body read failed"))?;
        if !status.is_success() {
            bail!("{model} request failed ({code}): {}", truncate_text(&body, 512));
        }
        serde_json::from_str(&body).with_context(|| format!("{model} returned invalid JSON payload"))
    }
}

fn part_to_value(part: &ContentPart) -> Value {
    match part {
        ContentPart::InlineImage { mime_type, data } => json!({
            "inlineData": {
                "mimeType": mime_type,
                "data": data,
            }
        }),
        ContentPart::Text(text) => json!({ "text": text }),
    }
}

fn parts_from_response(payload: &Value) -> Vec<ContentPart> {
    let mut out = Vec::new();
    let candidates = payload
        .get("candidates")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for candidate in candidates {
        let parts = candidate
            .get("content")
            .and_then(Value::as_object)
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for part in parts {
            if let Some(inline) = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
            {
                let data = inline
                    .get("data")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if !data.is_empty() {
                    let mime_type = inline
                        .get("mimeType")
                        .or_else(|| inline.get("mime_type"))
                        .and_then(Value::as_str)
                        .unwrap_or("image/png")
                        .to_string();
                    out.push(ContentPart::InlineImage {
                        mime_type,
                        data: data.to_string(),
                    });
                    continue;
                }
            }
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                out.push(ContentPart::Text(text.to_string()));
            }
        }
    }
    out
}

impl TextCapability for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_text(&self, request: &TextRequest) -> Result<String> {
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }],
            }],
            "systemInstruction": {
                "parts": [{ "text": request.system_instruction }],
            },
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": request.response_schema,
            },
        });
        let response = self.post(&request.model, &payload, TEXT_TIMEOUT)?;
        let text = parts_from_response(&response)
            .into_iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text),
                _ => None,
            })
            .collect::<Vec<String>>()
            .join("");
        Ok(text)
    }
}

impl ImageCapability for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_image(&self, request: &ImageRequest) -> Result<ImageResponse> {
        let mut generation_config = Map::new();
        generation_config.insert(
            "responseModalities".to_string(),
            Value::Array(vec![Value::String("IMAGE".to_string())]),
        );
        if let Some(config) = &request.image_config {
            generation_config.insert(
                "imageConfig".to_string(),
                json!({
                    "imageSize": config.image_size.as_str(),
                    "aspectRatio": config.aspect_ratio.as_str(),
                }),
            );
        }
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": request.parts.iter().map(part_to_value).collect::<Vec<Value>>(),
            }],
            "generationConfig": Value::Object(generation_config),
        });
        let response = self.post(&request.model, &payload, request.timeout)?;
        Ok(ImageResponse {
            parts: parts_from_response(&response),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct DryrunClient;

impl DryrunClient {
    pub fn new() -> Self {
        Self
    }
}

impl TextCapability for DryrunClient {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate_text(&self, _request: &TextRequest) -> Result<String> {
        Ok(format!("```json\n{}\n```", dryrun_concept_json()))
    }
}

impl ImageCapability for DryrunClient {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate_image(&self, request: &ImageRequest) -> Result<ImageResponse> {
        let prompt = request
            .parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<&str>>()
            .join(" ");
        let ratio = request
            .image_config
            .map(|config| config.aspect_ratio)
            .unwrap_or(AspectRatio::Square);
        let (width, height) = match ratio {
            AspectRatio::Square => (64, 64),
            AspectRatio::Wide => (96, 54),
            AspectRatio::Tall => (54, 96),
        };
        let (r, g, b) = color_from_prompt(&prompt);
        let mut canvas = RgbImage::new(width, height);
        for pixel in canvas.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        let mut bytes = Vec::new();
        canvas
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .context("dryrun image encode failed")?;
        Ok(ImageResponse {
            parts: vec![ContentPart::InlineImage {
                mime_type: "image/png".to_string(),
                data: BASE64.encode(bytes),
            }],
        })
    }
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

fn dryrun_concept_json() -> String {
    json!({
        "concepts": [{
            "name": "Quiet Signal",
            "summary": "A restrained, confident direction built on negative space.",
            "logoConcept": "A thin geometric monogram inside a broken circle, single accent color.",
            "typography": "Neue Haas Grotesk for display, Source Serif for long-form copy.",
            "colorPalette": [
                { "name": "Ink", "hex": "#141414", "usage": "Primary text and marks" },
                { "name": "Bone", "hex": "#F4F1EC", "usage": "Backgrounds" },
                { "name": "Signal", "hex": "#E4572E", "usage": "Accent moments" }
            ],
            "moodBoard": "Matte paper, raking light, close-up textures, unhurried mornings.",
            "brandVoice": {
                "tone": "Calm, direct, lightly warm",
                "dos": ["Use short sentences", "Name the product plainly"],
                "donts": ["No exclamation marks", "No trend-chasing slang"]
            },
            "missionVision": {
                "mission": "Make the everyday feel considered.",
                "vision": "The default choice for people who notice details."
            },
            "taglines": ["Considered, daily.", "Less, done well."],
            "socialStrategy": "Few posts, high craft; behind-the-scenes process over promotion.",
            "campaigns": [
                {
                    "platform": "Instagram",
                    "caption": "The first mark. More soon.",
                    "imagePrompt": "Minimal flat-lay of a logo sketch on matte paper, hard side light"
                },
                {
                    "platform": "LinkedIn",
                    "caption": "Why we rebuilt our identity from a single circle.",
                    "imagePrompt": "Clean workspace with brand guidelines binder, soft daylight"
                },
                {
                    "platform": "TikTok",
                    "caption": "Watch the logo come together in 20 seconds.",
                    "imagePrompt": "Stop-motion style frames of a monogram being drawn"
                }
            ]
        }]
    })
    .to_string()
}

pub fn concept_response_schema() -> Value {
    let concept = json!({
        "type": "OBJECT",
        "properties": {
            "name": { "type": "STRING", "description": "Creative name for this specific brand direction" },
            "summary": { "type": "STRING", "description": "One sentence summary of this strategic direction." },
            "logoConcept": { "type": "STRING", "description": "Detailed text description of the visual logo." },
            "typography": { "type": "STRING", "description": "Specific font recommendations and hierarchy." },
            "colorPalette": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": { "type": "STRING" },
                        "hex": { "type": "STRING" },
                        "usage": { "type": "STRING" }
                    },
                    "required": ["name", "hex", "usage"]
                }
            },
            "moodBoard": { "type": "STRING", "description": "A descriptive list of visual themes, textures, and feelings." },
            "brandVoice": {
                "type": "OBJECT",
                "properties": {
                    "tone": { "type": "STRING" },
                    "dos": { "type": "ARRAY", "items": { "type": "STRING" } },
                    "donts": { "type": "ARRAY", "items": { "type": "STRING" } }
                },
                "required": ["tone", "dos", "donts"]
            },
            "missionVision": {
                "type": "OBJECT",
                "properties": {
                    "mission": { "type": "STRING" },
                    "vision": { "type": "STRING" }
                },
                "required": ["mission", "vision"]
            },
            "taglines": { "type": "ARRAY", "items": { "type": "STRING" } },
            "socialStrategy": { "type": "STRING", "description": "Brief social media strategy for this direction." },
            "campaigns": {
                "type": "ARRAY",
                "description": "3 specific social media post ideas to launch this brand.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "platform": { "type": "STRING" },
                        "caption": { "type": "STRING" },
                        "imagePrompt": { "type": "STRING" }
                    },
                    "required": ["platform", "caption", "imagePrompt"]
                }
            }
        },
        "required": [
            "name", "summary", "logoConcept", "typography", "colorPalette",
            "moodBoard", "brandVoice", "missionVision", "taglines", "socialStrategy", "campaigns"
        ]
    });

    json!({
        "type": "OBJECT",
        "properties": {
            "concepts": {
                "type": "ARRAY",
                "items": concept,
                "description": "Exactly 1 distinct brand concept."
            }
        },
        "required": ["concepts"]
    })
}

fn build_concept_prompt(input: &BrandInput) -> String {
    let website_line = input
        .website_url
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .map(|value| format!("Website URL for context: {value}\n"))
        .unwrap_or_default();
    format!(
        "Act as a world-class AI Brand Agency. Develop a comprehensive brand identity package for:\n\n\
         Company Name: {}\n\
         Business Type: {}\n\
         Desired Brand Style: {}\n\
         Description: {}\n\
         {website_line}\n\
         Task: Create exactly 1 DISTINCT and UNIQUE brand concept (direction) for this company.\n\
         The concept should be a \"High-Quality/Premium\" choice.\n\n\
         Ensure the concept has a unique logo, color palette, voice, and a 3-post social media launch campaign.",
        input.company_name, input.business_type, input.brand_style, input.description,
    )
}

pub fn extract_json(text: &str) -> String {
    let cleaned = strip_code_fences(text);
    let cleaned = strip_full_line_comments(&cleaned);
    let cleaned = strip_trailing_commas(&cleaned);
    slice_outer_braces(&cleaned).unwrap_or_else(|| cleaned.trim().to_string())
}

fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "")
}

fn strip_full_line_comments(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.trim_start().starts_with("//") {
                ""
            } else {
                line
            }
        })
        .collect::<Vec<&str>>()
        .join("\n")
}

fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (index, ch) in chars.iter().enumerate() {
        if *ch == ',' {
            let next_meaningful = chars[index + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next_meaningful, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(*ch);
    }
    out
}

fn slice_outer_braces(text: &str) -> Option<String> {
    let first = text.find('{')?;
    let last = text.rfind('}')?;
    if last > first {
        return Some(text[first..=last].to_string());
    }
    None
}

pub fn parse_concepts(text: &str, now_millis: u64) -> Result<Vec<BrandConcept>> {
    if text.trim().is_empty() {
        bail!("no text returned from the model");
    }

    let repaired = extract_json(text);
    let parsed: Value = match serde_json::from_str(&repaired) {
        Ok(value) => value,
        Err(_) => {
            let salvaged = slice_outer_braces(text)
                .map(|span| strip_trailing_commas(&span))
                .and_then(|span| serde_json::from_str::<Value>(&span).ok());
            match salvaged {
                Some(value) => value,
                None => bail!("model returned invalid JSON after repair"),
            }
        }
    };

    let Some(rows) = parsed.get("concepts").and_then(Value::as_array) else {
        bail!("model response missing concepts array");
    };

    let mut concepts = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let mut entry = row.as_object().cloned().unwrap_or_default();
        entry.insert(
            "id".to_string(),
            Value::String(format!("concept-{now_millis}-{index}")),
        );
        let concept: BrandConcept = serde_json::from_value(Value::Object(entry))
            .context("brand concept shape invalid")?;
        concepts.push(concept);
    }
    Ok(concepts)
}

pub fn generate_brand_concepts(
    text: &dyn TextCapability,
    input: &BrandInput,
) -> Result<Vec<BrandConcept>> {
    let request = TextRequest {
        model: TEXT_MODEL.to_string(),
        prompt: build_concept_prompt(input),
        system_instruction: "Output pure JSON only. Do not use comments. Escape all special \
                             characters and newlines within strings."
            .to_string(),
        response_schema: concept_response_schema(),
    };
    let raw = text.generate_text(&request)?;
    parse_concepts(&raw, timestamp_millis())
}

pub fn is_capacity_error(err: &anyhow::Error) -> bool {
    let rendered = error_chain_text(err, 2048);
    ["429", "RESOURCE_EXHAUSTED", "403", "PERMISSION_DENIED"]
        .iter()
        .any(|marker| rendered.contains(marker))
}

pub struct ImageSynthesizer<'a> {
    capability: &'a dyn ImageCapability,
    events: &'a EventWriter,
}

impl<'a> ImageSynthesizer<'a> {
    pub fn new(capability: &'a dyn ImageCapability, events: &'a EventWriter) -> Self {
        Self { capability, events }
    }

    pub fn synthesize(
        &self,
        prompt: &str,
        size: ImageSize,
        ratio: AspectRatio,
        reference: Option<&str>,
    ) -> Result<String> {
        let mut parts = Vec::new();
        if let Some(part) = reference.and_then(reference_image_part) {
            parts.push(part);
        }
        parts.push(ContentPart::Text(prompt.to_string()));

        let primary = ImageRequest {
            model: PRIMARY_IMAGE_MODEL.to_string(),
            parts: parts.clone(),
            image_config: Some(ImageConfig {
                image_size: size,
                aspect_ratio: ratio,
            }),
            timeout: IMAGE_TIMEOUT,
        };

        let primary_error = match self
            .capability
            .generate_image(&primary)
            .and_then(|response| extract_image_payload(&response))
        {
            Ok(url) => return Ok(url),
            Err(err) => err,
        };

        if !is_capacity_error(&primary_error) {
            return Err(primary_error);
        }

        let mut fallback_parts = parts;
        fallback_parts.push(ContentPart::Text(ratio.prompt_hint()));
        let fallback = ImageRequest {
            model: FALLBACK_IMAGE_MODEL.to_string(),
            parts: fallback_parts,
            image_config: None,
            timeout: IMAGE_TIMEOUT,
        };
        let _ = self.events.emit(
            "image_fallback",
            payload(json!({
                "from": PRIMARY_IMAGE_MODEL,
                "to": FALLBACK_IMAGE_MODEL,
                "error": error_chain_text(&primary_error, 512),
            })),
        );

        match self
            .capability
            .generate_image(&fallback)
            .and_then(|response| extract_image_payload(&response))
        {
            Ok(url) => Ok(url),
            Err(fallback_error) => {
                let _ = self.events.emit(
                    "image_fallback_failed",
                    payload(json!({
                        "error": error_chain_text(&fallback_error, 512),
                    })),
                );
                Err(primary_error)
            }
        }
    }
}

fn reference_image_part(reference: &str) -> Option<ContentPart> {
    if reference.starts_with("error") {
        return None;
    }
    let data = reference
        .split_once(',')
        .map(|(_, tail)| tail)
        .unwrap_or(reference);
    if data.len() <= MIN_REFERENCE_PAYLOAD_CHARS {
        return None;
    }
    Some(ContentPart::InlineImage {
        mime_type: "image/png".to_string(),
        data: data.to_string(),
    })
}

fn extract_image_payload(response: &ImageResponse) -> Result<String> {
    for part in &response.parts {
        if let ContentPart::InlineImage { mime_type, data } = part {
            return Ok(format!("data:{mime_type};base64,{data}"));
        }
    }
    if let Some(ContentPart::Text(text)) = response
        .parts
        .iter()
        .find(|part| matches!(part, ContentPart::Text(_)))
    {
        bail!(
            "model returned text instead of an image: {}",
            truncate_text(text, 80)
        );
    }
    bail!("no image data found in response");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSlot {
    Logo,
    MoodBoard,
    Mockups,
    Social,
}

impl AssetSlot {
    pub fn id(self) -> &'static str {
        match self {
            AssetSlot::Logo => "logo",
            AssetSlot::MoodBoard => "moodboard",
            AssetSlot::Mockups => "mockups",
            AssetSlot::Social => "social",
        }
    }
}

pub struct Studio {
    store: ProjectStore,
    text: Box<dyn TextCapability>,
    image: Box<dyn ImageCapability>,
    events: EventWriter,
}

impl Studio {
    pub fn new(
        store: ProjectStore,
        text: Box<dyn TextCapability>,
        image: Box<dyn ImageCapability>,
        events: EventWriter,
    ) -> Self {
        Self {
            store,
            text,
            image,
            events,
        }
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    #[cfg(test)]
    fn store_for_tests(&mut self) -> &mut ProjectStore {
        &mut self.store
    }

    pub fn projects(&self) -> &[Project] {
        self.store.projects()
    }

    pub fn project(&self, project_id: &str) -> Option<&Project> {
        self.store.project(project_id)
    }

    pub fn delete_project(&mut self, project_id: &str) -> bool {
        self.store.delete_project(project_id)
    }

    pub fn create_project(&mut self, input: BrandInput) -> Result<String> {
        let now = timestamp_millis();
        let mut project = Project::new(now.to_string(), now, &input);

        let concepts = match generate_brand_concepts(self.text.as_ref(), &input) {
            Ok(concepts) => concepts,
            Err(err) => {
                let _ = self.events.emit(
                    "concept_generation_failed",
                    payload(json!({ "error": error_chain_text(&err, 512) })),
                );
                return Err(err);
            }
        };

        if concepts.is_empty() {
            bail!("model returned an empty concepts array");
        }
        project.concepts = concepts;
        project.status = ProjectStatus::GeneratingImages;
        let project_id = project.id.clone();
        let concept_count = project.concepts.len();
        self.store.insert_project(project);
        let _ = self.events.emit(
            "project_created",
            payload(json!({
                "project_id": project_id,
                "concepts": concept_count,
            })),
        );
        Ok(project_id)
    }

    pub fn add_concept(&mut self, project_id: &str) -> Result<String> {
        let project = self
            .store
            .project(project_id)
            .with_context(|| format!("unknown project {project_id}"))?;
        let previous_status = project.status;
        let concept_index = project.concepts.len();
        let input = BrandInput {
            company_name: project.company_name.clone(),
            description: project.description.clone(),
            business_type: project.business_type.clone(),
            brand_style: project.brand_style.clone(),
            website_url: project.website_url.clone(),
        };

        self.store
            .set_status(project_id, ProjectStatus::GeneratingText);
        let generated = generate_brand_concepts(self.text.as_ref(), &input);
        let mut concepts = match generated {
            Ok(concepts) => concepts,
            Err(err) => {
                self.store.set_status(project_id, previous_status);
                let _ = self.events.emit(
                    "concept_generation_failed",
                    payload(json!({
                        "project_id": project_id,
                        "error": error_chain_text(&err, 512),
                    })),
                );
                return Err(err);
            }
        };
        let Some(mut concept) = concepts.drain(..).next() else {
            self.store.set_status(project_id, previous_status);
            bail!("model returned an empty concepts array");
        };
        concept.id = format!("concept-{}-{}", timestamp_millis(), concept_index);
        let concept_id = concept.id.clone();
        self.store.append_concept(project_id, concept);
        self.store
            .set_status(project_id, ProjectStatus::GeneratingImages);
        let _ = self.events.emit(
            "concept_generated",
            payload(json!({
                "project_id": project_id,
                "concept_id": concept_id,
            })),
        );
        Ok(concept_id)
    }

    pub fn generate_step_asset(
        &mut self,
        project_id: &str,
        concept_id: &str,
        slot: AssetSlot,
    ) -> Result<()> {
        let project = self
            .store
            .project(project_id)
            .with_context(|| format!("unknown project {project_id}"))?;
        let concept = project
            .concept(concept_id)
            .with_context(|| format!("unknown concept {concept_id}"))?
            .clone();
        let company_name = project.company_name.clone();
        let business_type = project.business_type.clone();
        let brand_style = project.brand_style.clone();

        let _ = self.events.emit(
            "asset_requested",
            payload(json!({
                "project_id": project_id,
                "concept_id": concept_id,
                "slot": slot.id(),
            })),
        );

        match slot {
            AssetSlot::Logo => {
                self.store.update_concept(
                    project_id,
                    concept_id,
                    &ConceptPatch::logo(AssetState::Pending),
                );
                let prompt = format!(
                    "Minimalist vector logo for {company_name} ({business_type}). \
                     Concept: {}. Style: {brand_style}. \
                     Solid background, high quality, professional design.",
                    concept.logo_concept
                );
                let result = self.synthesizer().synthesize(
                    &prompt,
                    ImageSize::OneK,
                    AspectRatio::Square,
                    None,
                );
                self.finish_hero(project_id, concept_id, slot, &concept, result);
            }
            AssetSlot::MoodBoard => {
                self.store.update_concept(
                    project_id,
                    concept_id,
                    &ConceptPatch::mood_board(AssetState::Pending),
                );
                let prompt = format!(
                    "Professional moodboard layout for {company_name}. Theme: {}. \
                     Style: {brand_style}. Include visual textures, color swatches matching \
                     palette, and lifestyle imagery. High resolution, 4k.",
                    concept.mood_board
                );
                let reference = concept.logo_url.payload().map(str::to_string);
                let result = self.synthesizer().synthesize(
                    &prompt,
                    ImageSize::OneK,
                    AspectRatio::Wide,
                    reference.as_deref(),
                );
                self.finish_hero(project_id, concept_id, slot, &concept, result);
            }
            AssetSlot::Mockups => {
                let base_prompt = format!(
                    "Brand application for {company_name} ({business_type}). \
                     Style: {brand_style}. Theme: {}.",
                    concept.summary
                );
                let reference = concept.logo_url.payload().map(str::to_string);

                let mut loading = ConceptPatch::default();
                for kind in MockupKind::ALL {
                    loading
                        .mockups
                        .insert(kind, AssetState::Pending);
                }
                self.store.update_concept(project_id, concept_id, &loading);

                for kind in MockupKind::ALL {
                    let prompt = format!("{base_prompt} {}", kind.prompt_suffix());
                    let result = self.synthesizer().synthesize(
                        &prompt,
                        ImageSize::OneK,
                        kind.aspect_ratio(),
                        reference.as_deref(),
                    );
                    let state = self.record_item_result(
                        project_id,
                        concept_id,
                        slot,
                        kind.key(),
                        result,
                    );
                    self.store.update_concept(
                        project_id,
                        concept_id,
                        &ConceptPatch::mockup(kind, state),
                    );
                }
            }
            AssetSlot::Social => {
                let reference = concept.logo_url.payload().map(str::to_string);
                let campaigns = concept.campaigns.clone();

                let mut loading = ConceptPatch::default();
                for index in 0..campaigns.len() {
                    loading
                        .campaign_assets
                        .insert(index as u32, AssetState::Pending);
                }
                self.store.update_concept(project_id, concept_id, &loading);

                for (index, post) in campaigns.iter().enumerate() {
                    let prompt = format!(
                        "Social media image for {company_name}. Platform: {}. {}",
                        post.platform, post.image_prompt
                    );
                    let result = self.synthesizer().synthesize(
                        &prompt,
                        ImageSize::OneK,
                        AspectRatio::Square,
                        reference.as_deref(),
                    );
                    let state = self.record_item_result(
                        project_id,
                        concept_id,
                        slot,
                        &index.to_string(),
                        result,
                    );
                    self.store.update_concept(
                        project_id,
                        concept_id,
                        &ConceptPatch::campaign_asset(index as u32, state),
                    );
                }
            }
        }
        Ok(())
    }

    pub fn select_version(
        &mut self,
        project_id: &str,
        concept_id: &str,
        slot: AssetSlot,
        version_id: &str,
    ) -> Result<()> {
        let concept = self
            .store
            .concept(project_id, concept_id)
            .with_context(|| format!("unknown concept {concept_id}"))?;
        let history = match slot {
            AssetSlot::Logo => &concept.logo_history,
            AssetSlot::MoodBoard => &concept.mood_board_history,
            _ => bail!("slot {} keeps no version history", slot.id()),
        };
        let Some(version) = visible_history(history)
            .into_iter()
            .find(|version| version.id == version_id)
        else {
            bail!("unknown version {version_id} for slot {}", slot.id());
        };
        let state = AssetState::Ready(version.url.clone());
        let patch = match slot {
            AssetSlot::Logo => ConceptPatch::logo(state),
            AssetSlot::MoodBoard => ConceptPatch::mood_board(state),
            _ => unreachable!(),
        };
        self.store.update_concept(project_id, concept_id, &patch);
        let _ = self.events.emit(
            "version_selected",
            payload(json!({
                "project_id": project_id,
                "concept_id": concept_id,
                "slot": slot.id(),
                "version_id": version_id,
            })),
        );
        Ok(())
    }

    fn synthesizer(&self) -> ImageSynthesizer<'_> {
        ImageSynthesizer::new(self.image.as_ref(), &self.events)
    }

    fn finish_hero(
        &mut self,
        project_id: &str,
        concept_id: &str,
        slot: AssetSlot,
        concept: &BrandConcept,
        result: Result<String>,
    ) {
        let patch = match result {
            Ok(url) => {
                let now = timestamp_millis();
                let _ = self.events.emit(
                    "asset_ready",
                    payload(json!({
                        "project_id": project_id,
                        "concept_id": concept_id,
                        "slot": slot.id(),
                    })),
                );
                match slot {
                    AssetSlot::Logo => {
                        let history = push_version(&concept.logo_history, &url, now);
                        let mut patch = ConceptPatch::logo(AssetState::Ready(url));
                        patch.logo_history = Some(history);
                        patch
                    }
                    AssetSlot::MoodBoard => {
                        let history = push_version(&concept.mood_board_history, &url, now);
                        let mut patch = ConceptPatch::mood_board(AssetState::Ready(url));
                        patch.mood_board_history = Some(history);
                        patch
                    }
                    _ => unreachable!("finish_hero only handles hero slots"),
                }
            }
            Err(err) => {
                let _ = self.events.emit(
                    "asset_failed",
                    payload(json!({
                        "project_id": project_id,
                        "concept_id": concept_id,
                        "slot": slot.id(),
                        "error": error_chain_text(&err, 512),
                    })),
                );
                match slot {
                    AssetSlot::Logo => ConceptPatch::logo(AssetState::Failed),
                    AssetSlot::MoodBoard => ConceptPatch::mood_board(AssetState::Failed),
                    _ => unreachable!("finish_hero only handles hero slots"),
                }
            }
        };
        self.store.update_concept(project_id, concept_id, &patch);
    }

    fn record_item_result(
        &self,
        project_id: &str,
        concept_id: &str,
        slot: AssetSlot,
        item: &str,
        result: Result<String>,
    ) -> AssetState {
        match result {
            Ok(url) => {
                let _ = self.events.emit(
                    "asset_ready",
                    payload(json!({
                        "project_id": project_id,
                        "concept_id": concept_id,
                        "slot": slot.id(),
                        "item": item,
                    })),
                );
                AssetState::Ready(url)
            }
            Err(err) => {
                let _ = self.events.emit(
                    "asset_failed",
                    payload(json!({
                        "project_id": project_id,
                        "concept_id": concept_id,
                        "slot": slot.id(),
                        "item": item,
                        "error": error_chain_text(&err, 512),
                    })),
                );
                AssetState::Failed
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Mark,
    Typography,
    Palette,
    Mood,
    Mockups,
    Social,
    Strategy,
}

pub const STEPS: [Step; 7] = [
    Step::Mark,
    Step::Typography,
    Step::Palette,
    Step::Mood,
    Step::Mockups,
    Step::Social,
    Step::Strategy,
];

impl Step {
    pub fn id(self) -> &'static str {
        match self {
            Step::Mark => "mark",
            Step::Typography => "typography",
            Step::Palette => "palette",
            Step::Mood => "mood",
            Step::Mockups => "mockups",
            Step::Social => "social",
            Step::Strategy => "strategy",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Step::Mark => "The Mark",
            Step::Typography => "Typography",
            Step::Palette => "Palette",
            Step::Mood => "The Vibe",
            Step::Mockups => "In Context",
            Step::Social => "Social Launch",
            Step::Strategy => "Strategy",
        }
    }

    pub fn resolve(input: &str) -> Option<usize> {
        let trimmed = input.trim().to_ascii_lowercase();
        if let Ok(position) = trimmed.parse::<usize>() {
            if (1..=STEPS.len()).contains(&position) {
                return Some(position - 1);
            }
            return None;
        }
        STEPS.iter().position(|step| step.id() == trimmed)
    }

    fn slot(self) -> Option<AssetSlot> {
        match self {
            Step::Mark => Some(AssetSlot::Logo),
            Step::Mood => Some(AssetSlot::MoodBoard),
            Step::Mockups => Some(AssetSlot::Mockups),
            Step::Social => Some(AssetSlot::Social),
            _ => None,
        }
    }
}

pub struct ConceptWalk {
    project_id: String,
    concept_id: String,
    step_index: usize,
}

impl ConceptWalk {
    pub fn new(project_id: impl Into<String>, concept_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            concept_id: concept_id.into(),
            step_index: 0,
        }
    }

    pub fn step(&self) -> Step {
        STEPS[self.step_index]
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn concept_id(&self) -> &str {
        &self.concept_id
    }

    pub fn set_concept(&mut self, concept_id: impl Into<String>) {
        self.concept_id = concept_id.into();
        self.step_index = 0;
    }

    pub fn enter(&self, studio: &mut Studio) -> Result<()> {
        let Some(slot) = self.step().slot() else {
            return Ok(());
        };
        let concept = studio
            .store()
            .concept(&self.project_id, &self.concept_id)
            .with_context(|| format!("unknown concept {}", self.concept_id))?;
        let needs_generation = match slot {
            AssetSlot::Logo => concept.logo_url.is_not_requested(),
            AssetSlot::MoodBoard => concept.mood_board_url.is_not_requested(),
            AssetSlot::Mockups => concept.mockups.is_empty(),
            AssetSlot::Social => concept.campaign_assets.is_empty() && !concept.campaigns.is_empty(),
        };
        if needs_generation {
            studio.generate_step_asset(&self.project_id, &self.concept_id, slot)?;
        }
        Ok(())
    }

    pub fn can_proceed(&self, studio: &Studio) -> bool {
        let Some(concept) = studio.store().concept(&self.project_id, &self.concept_id) else {
            return false;
        };
        match self.step() {
            Step::Mark => concept.logo_url.is_ready(),
            Step::Mood => concept.mood_board_url.is_ready(),
            Step::Mockups => !concept.mockups.is_empty(),
            _ => true,
        }
    }

    pub fn next(&mut self, studio: &mut Studio) -> Result<bool> {
        if self.step_index + 1 >= STEPS.len() || !self.can_proceed(studio) {
            return Ok(false);
        }
        self.step_index += 1;
        self.enter(studio)?;
        Ok(true)
    }

    pub fn back(&mut self, studio: &mut Studio) -> Result<bool> {
        if self.step_index == 0 {
            return Ok(false);
        }
        self.step_index -= 1;
        self.enter(studio)?;
        Ok(true)
    }

    pub fn jump(&mut self, studio: &mut Studio, target_index: usize) -> Result<bool> {
        if target_index >= STEPS.len() {
            return Ok(false);
        }
        if target_index > self.step_index && !self.can_proceed(studio) {
            return Ok(false);
        }
        self.step_index = target_index;
        self.enter(studio)?;
        Ok(true)
    }
}

pub fn timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}

pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn payload(value: Value) -> EventPayload {
    value.as_object().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct FakeText {
        script: Arc<Mutex<VecDeque<std::result::Result<String, String>>>>,
    }

    impl FakeText {
        fn ok(response: impl Into<String>) -> Self {
            let fake = Self::default();
            fake.push_ok(response);
            fake
        }

        fn err(message: impl Into<String>) -> Self {
            let fake = Self::default();
            fake.push_err(message);
            fake
        }

        fn push_ok(&self, response: impl Into<String>) {
            self.script
                .lock()
                .expect("script lock")
                .push_back(Ok(response.into()));
        }

        fn push_err(&self, message: impl Into<String>) {
            self.script
                .lock()
                .expect("script lock")
                .push_back(Err(message.into()));
        }
    }

    impl TextCapability for FakeText {
        fn name(&self) -> &str {
            "fake-text"
        }

        fn generate_text(&self, _request: &TextRequest) -> Result<String> {
            let step = self
                .script
                .lock()
                .expect("script lock")
                .pop_front()
                .expect("text script exhausted");
            match step {
                Ok(text) => Ok(text),
                Err(message) => bail!("{message}"),
            }
        }
    }

    enum ImageScript {
        Inline(String),
        Text(String),
        Fail(String),
    }

    #[derive(Clone, Default)]
    struct FakeImage {
        script: Arc<Mutex<VecDeque<ImageScript>>>,
        requests: Arc<Mutex<Vec<ImageRequest>>>,
    }

    impl FakeImage {
        fn new() -> Self {
            Self::default()
        }

        fn push_inline(&self, data: &str) {
            self.script
                .lock()
                .expect("script lock")
                .push_back(ImageScript::Inline(data.to_string()));
        }

        fn push_text(&self, text: &str) {
            self.script
                .lock()
                .expect("script lock")
                .push_back(ImageScript::Text(text.to_string()));
        }

        fn push_fail(&self, message: &str) {
            self.script
                .lock()
                .expect("script lock")
                .push_back(ImageScript::Fail(message.to_string()));
        }

        fn requests(&self) -> Vec<ImageRequest> {
            self.requests.lock().expect("requests lock").clone()
        }
    }

    impl ImageCapability for FakeImage {
        fn name(&self) -> &str {
            "fake-image"
        }

        fn generate_image(&self, request: &ImageRequest) -> Result<ImageResponse> {
            self.requests
                .lock()
                .expect("requests lock")
                .push(request.clone());
            let step = self
                .script
                .lock()
                .expect("script lock")
                .pop_front()
                .expect("image script exhausted");
            match step {
                ImageScript::Inline(data) => Ok(ImageResponse {
                    parts: vec![ContentPart::InlineImage {
                        mime_type: "image/png".to_string(),
                        data,
                    }],
                }),
                ImageScript::Text(text) => Ok(ImageResponse {
                    parts: vec![ContentPart::Text(text)],
                }),
                ImageScript::Fail(message) => bail!("{message}"),
            }
        }
    }

    fn test_events(dir: &Path) -> EventWriter {
        EventWriter::new(dir.join("events.jsonl"), "session-test")
    }

    fn nova_input() -> BrandInput {
        BrandInput {
            company_name: "Nova".to_string(),
            description: "x".to_string(),
            business_type: "Coffee Shop".to_string(),
            brand_style: "Minimalist".to_string(),
            website_url: None,
        }
    }

    fn long_payload() -> String {
        format!("data:image/png;base64,{}", "A".repeat(200))
    }

    fn seeded_studio(dir: &Path, image: FakeImage) -> (Studio, String, String) {
        let events = test_events(dir);
        let store = ProjectStore::open(dir, events.clone());
        let text = FakeText::ok(format!("```json\n{}\n```", dryrun_concept_json()));
        let mut studio = Studio::new(store, Box::new(text), Box::new(image), events);
        let project_id = studio.create_project(nova_input()).expect("create project");
        let concept_id = studio
            .project(&project_id)
            .expect("project")
            .concepts[0]
            .id
            .clone();
        (studio, project_id, concept_id)
    }

    #[test]
    fn extract_json_is_idempotent() {
        let raw = "```json\n{\n  // model commentary\n  \"concepts\": [\n    {\"name\": \"A\",},\n  ],\n}\n```";
        let once = extract_json(raw);
        let twice = extract_json(&once);
        assert_eq!(once, twice);
        let parsed: Value = serde_json::from_str(&once).expect("repaired output parses");
        assert_eq!(parsed["concepts"][0]["name"], json!("A"));
    }

    #[test]
    fn comment_stripping_preserves_urls() {
        let raw = "{\n  // a note\n  \"description\": \"see https://example.com for details\"\n}";
        let cleaned = extract_json(raw);
        let parsed: Value = serde_json::from_str(&cleaned).expect("parses");
        assert_eq!(
            parsed["description"],
            json!("see https://example.com for details")
        );
    }

    #[test]
    fn parse_concepts_assigns_fresh_ids() -> Result<()> {
        let concepts = parse_concepts(&dryrun_concept_json(), 1_234)?;
        assert_eq!(concepts.len(), 1);
        assert_eq!(concepts[0].id, "concept-1234-0");
        assert_eq!(concepts[0].campaigns.len(), 3);
        assert!(concepts[0].logo_url.is_not_requested());
        Ok(())
    }

    #[test]
    fn parse_concepts_reports_distinct_failures() {
        let empty = parse_concepts("   ", 1).unwrap_err();
        assert!(empty.to_string().contains("no text returned"));

        let garbage = parse_concepts("the model had nothing to say", 1).unwrap_err();
        assert!(garbage.to_string().contains("invalid JSON"));

        let wrong_shape = parse_concepts("{\"directions\": []}", 1).unwrap_err();
        assert!(wrong_shape.to_string().contains("missing concepts array"));
    }

    #[test]
    fn fallback_on_quota_returns_secondary_result() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let events = test_events(temp.path());
        let image = FakeImage::new();
        image.push_fail("gemini-3-pro-image-preview request failed (429): RESOURCE_EXHAUSTED");
        image.push_inline("Zm9v");

        let synthesizer = ImageSynthesizer::new(&image, &events);
        let url = synthesizer.synthesize("a logo", ImageSize::OneK, AspectRatio::Square, None)?;
        assert_eq!(url, "data:image/png;base64,Zm9v");

        let requests = image.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].model, PRIMARY_IMAGE_MODEL);
        assert!(requests[0].image_config.is_some());
        assert_eq!(requests[1].model, FALLBACK_IMAGE_MODEL);
        assert!(requests[1].image_config.is_none());
        assert_eq!(
            requests[1].parts.last(),
            Some(&ContentPart::Text(" Aspect ratio 1 to 1.".to_string()))
        );
        Ok(())
    }

    #[test]
    fn exhausted_fallback_surfaces_the_primary_error() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let events = test_events(temp.path());
        let image = FakeImage::new();
        image.push_fail("primary quota hit (429)");
        image.push_fail("secondary also down");

        let synthesizer = ImageSynthesizer::new(&image, &events);
        let err = synthesizer
            .synthesize("a logo", ImageSize::OneK, AspectRatio::Square, None)
            .unwrap_err();
        let rendered = error_chain_text(&err, 512);
        assert!(rendered.contains("primary quota hit"));
        assert!(!rendered.contains("secondary also down"));

        let raw = std::fs::read_to_string(temp.path().join("events.jsonl"))?;
        assert!(raw.contains("image_fallback_failed"));
        assert!(raw.contains("secondary also down"));
        Ok(())
    }

    #[test]
    fn non_capacity_failures_skip_the_fallback() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let events = test_events(temp.path());
        let image = FakeImage::new();
        image.push_fail("500 internal error");

        let synthesizer = ImageSynthesizer::new(&image, &events);
        let err = synthesizer
            .synthesize("a logo", ImageSize::OneK, AspectRatio::Square, None)
            .unwrap_err();
        assert!(err.to_string().contains("500 internal error"));
        assert_eq!(image.requests().len(), 1);
        Ok(())
    }

    #[test]
    fn refusal_text_is_surfaced_not_swallowed() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let events = test_events(temp.path());
        let image = FakeImage::new();
        image.push_text("I cannot generate that image.");

        let synthesizer = ImageSynthesizer::new(&image, &events);
        let err = synthesizer
            .synthesize("a logo", ImageSize::OneK, AspectRatio::Square, None)
            .unwrap_err();
        assert!(err.to_string().contains("returned text instead of an image"));
        assert!(err.to_string().contains("I cannot generate that image."));
        assert_eq!(image.requests().len(), 1);
        Ok(())
    }

    #[test]
    fn unusable_references_are_dropped() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let events = test_events(temp.path());

        for reference in ["error_failed", "data:image/png;base64,short"] {
            let image = FakeImage::new();
            image.push_inline("Zm9v");
            let synthesizer = ImageSynthesizer::new(&image, &events);
            synthesizer.synthesize(
                "a moodboard",
                ImageSize::OneK,
                AspectRatio::Wide,
                Some(reference),
            )?;
            let requests = image.requests();
            assert_eq!(requests[0].parts.len(), 1, "reference {reference} attached");
        }

        let image = FakeImage::new();
        image.push_inline("Zm9v");
        let synthesizer = ImageSynthesizer::new(&image, &events);
        let reference = long_payload();
        synthesizer.synthesize(
            "a moodboard",
            ImageSize::OneK,
            AspectRatio::Wide,
            Some(&reference),
        )?;
        let requests = image.requests();
        assert_eq!(requests[0].parts.len(), 2);
        assert!(matches!(
            &requests[0].parts[0],
            ContentPart::InlineImage { data, .. } if data == &"A".repeat(200)
        ));
        Ok(())
    }

    #[test]
    fn create_project_end_to_end() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let (studio, project_id, _) = seeded_studio(temp.path(), FakeImage::new());

        let project = studio.project(&project_id).expect("project");
        assert_eq!(project.status, ProjectStatus::GeneratingImages);
        assert_eq!(project.concepts.len(), 1);

        let concept_id = &project.concepts[0].id;
        let mut sections = concept_id.split('-');
        assert_eq!(sections.next(), Some("concept"));
        let millis = sections.next().unwrap_or_default();
        assert!(!millis.is_empty() && millis.chars().all(|ch| ch.is_ascii_digit()));
        assert_eq!(sections.next(), Some("0"));
        Ok(())
    }

    #[test]
    fn failed_creation_inserts_nothing_and_classifies_capacity() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let events = test_events(temp.path());
        let store = ProjectStore::open(temp.path(), events.clone());
        let text = FakeText::err("text request failed (403): PERMISSION_DENIED");
        let mut studio = Studio::new(store, Box::new(text), Box::new(FakeImage::new()), events);

        let err = studio.create_project(nova_input()).unwrap_err();
        assert!(is_capacity_error(&err));
        assert!(studio.projects().is_empty());
        Ok(())
    }

    #[test]
    fn logo_failure_is_recorded_and_regenerable() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let image = FakeImage::new();
        image.push_fail("transient blip");
        let (mut studio, project_id, concept_id) = seeded_studio(temp.path(), image.clone());

        studio.generate_step_asset(&project_id, &concept_id, AssetSlot::Logo)?;
        let concept = studio.store().concept(&project_id, &concept_id).expect("concept");
        assert!(concept.logo_url.is_failed());
        assert!(concept.logo_history.is_empty());

        image.push_inline(&"B".repeat(200));
        studio.generate_step_asset(&project_id, &concept_id, AssetSlot::Logo)?;
        let concept = studio.store().concept(&project_id, &concept_id).expect("concept");
        assert!(concept.logo_url.is_ready());
        assert_eq!(concept.logo_history.len(), 1);
        Ok(())
    }

    #[test]
    fn regenerating_the_logo_grows_history_newest_first() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let image = FakeImage::new();
        image.push_inline(&"C".repeat(200));
        image.push_inline(&"D".repeat(200));
        let (mut studio, project_id, concept_id) = seeded_studio(temp.path(), image);

        studio.generate_step_asset(&project_id, &concept_id, AssetSlot::Logo)?;
        studio.generate_step_asset(&project_id, &concept_id, AssetSlot::Logo)?;

        let concept = studio.store().concept(&project_id, &concept_id).expect("concept");
        assert_eq!(concept.logo_history.len(), 2);
        assert_eq!(
            concept.logo_url.payload(),
            Some(concept.logo_history[0].url.as_str())
        );
        assert!(concept.logo_history[0].url.contains(&"D".repeat(200)));
        assert!(concept.logo_history[1].url.contains(&"C".repeat(200)));
        Ok(())
    }

    #[test]
    fn selecting_an_older_version_switches_the_active_asset() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let image = FakeImage::new();
        image.push_inline(&"C".repeat(200));
        image.push_inline(&"D".repeat(200));
        let (mut studio, project_id, concept_id) = seeded_studio(temp.path(), image);

        studio.generate_step_asset(&project_id, &concept_id, AssetSlot::Logo)?;
        studio.generate_step_asset(&project_id, &concept_id, AssetSlot::Logo)?;

        let older = studio
            .store()
            .concept(&project_id, &concept_id)
            .expect("concept")
            .logo_history[1]
            .clone();
        studio.select_version(&project_id, &concept_id, AssetSlot::Logo, &older.id)?;

        let concept = studio.store().concept(&project_id, &concept_id).expect("concept");
        assert_eq!(concept.logo_url.payload(), Some(older.url.as_str()));
        assert_eq!(concept.logo_history.len(), 2);
        Ok(())
    }

    #[test]
    fn moodboard_uses_a_ready_logo_as_reference() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let image = FakeImage::new();
        image.push_inline(&"E".repeat(200));
        image.push_inline("bW9vZA==");
        let (mut studio, project_id, concept_id) = seeded_studio(temp.path(), image.clone());

        studio.generate_step_asset(&project_id, &concept_id, AssetSlot::Logo)?;
        studio.generate_step_asset(&project_id, &concept_id, AssetSlot::MoodBoard)?;

        let requests = image.requests();
        assert_eq!(requests.len(), 2);
        assert!(matches!(
            &requests[1].parts[0],
            ContentPart::InlineImage { data, .. } if data == &"E".repeat(200)
        ));
        assert_eq!(
            requests[1].image_config.map(|config| config.aspect_ratio),
            Some(AspectRatio::Wide)
        );
        Ok(())
    }

    #[test]
    fn failed_logo_is_never_used_as_reference() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let image = FakeImage::new();
        image.push_fail("logo failed");
        image.push_inline("bW9vZA==");
        let (mut studio, project_id, concept_id) = seeded_studio(temp.path(), image.clone());

        studio.generate_step_asset(&project_id, &concept_id, AssetSlot::Logo)?;
        studio.generate_step_asset(&project_id, &concept_id, AssetSlot::MoodBoard)?;

        let requests = image.requests();
        assert_eq!(requests[1].parts.len(), 1);
        Ok(())
    }

    #[test]
    fn mockup_batch_isolates_per_item_failures() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let image = FakeImage::new();
        for index in 0..9 {
            if index == 3 {
                image.push_fail("mockup blew up");
            } else {
                image.push_inline(&format!("bW9jaw{index}="));
            }
        }
        let (mut studio, project_id, concept_id) = seeded_studio(temp.path(), image);

        studio.generate_step_asset(&project_id, &concept_id, AssetSlot::Mockups)?;

        let concept = studio.store().concept(&project_id, &concept_id).expect("concept");
        assert_eq!(concept.mockups.len(), 9);
        for (position, kind) in MockupKind::ALL.iter().enumerate() {
            let state = concept.mockups.get(kind).expect("mockup state");
            assert!(!state.is_pending(), "{kind:?} left pending");
            if position == 3 {
                assert!(state.is_failed());
            } else {
                assert!(state.is_ready(), "{kind:?} not ready");
            }
        }
        Ok(())
    }

    #[test]
    fn campaign_images_fill_in_by_index() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let image = FakeImage::new();
        image.push_inline("cG9zdDA=");
        image.push_fail("post 1 failed");
        image.push_inline("cG9zdDI=");
        let (mut studio, project_id, concept_id) = seeded_studio(temp.path(), image);

        studio.generate_step_asset(&project_id, &concept_id, AssetSlot::Social)?;

        let concept = studio.store().concept(&project_id, &concept_id).expect("concept");
        assert_eq!(concept.campaign_assets.len(), 3);
        assert!(concept.campaign_assets.get(&0).is_some_and(AssetState::is_ready));
        assert!(concept.campaign_assets.get(&1).is_some_and(AssetState::is_failed));
        assert!(concept.campaign_assets.get(&2).is_some_and(AssetState::is_ready));
        Ok(())
    }

    #[test]
    fn walk_gate_follows_logo_state() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let (mut studio, project_id, concept_id) = seeded_studio(temp.path(), FakeImage::new());
        let walk = ConceptWalk::new(project_id.clone(), concept_id.clone());
        assert_eq!(walk.step(), Step::Mark);

        studio.store_for_tests().update_concept(
            &project_id,
            &concept_id,
            &ConceptPatch::logo(AssetState::Pending),
        );
        assert!(!walk.can_proceed(&studio));

        studio.store_for_tests().update_concept(
            &project_id,
            &concept_id,
            &ConceptPatch::logo(AssetState::Ready(long_payload())),
        );
        assert!(walk.can_proceed(&studio));

        studio.store_for_tests().update_concept(
            &project_id,
            &concept_id,
            &ConceptPatch::logo(AssetState::Failed),
        );
        assert!(!walk.can_proceed(&studio));
        Ok(())
    }

    #[test]
    fn walk_enters_trigger_generation_once() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let image = FakeImage::new();
        image.push_inline(&"F".repeat(200));
        let (mut studio, project_id, concept_id) = seeded_studio(temp.path(), image.clone());

        let walk = ConceptWalk::new(project_id, concept_id);
        walk.enter(&mut studio)?;
        assert_eq!(image.requests().len(), 1);

        walk.enter(&mut studio)?;
        assert_eq!(image.requests().len(), 1);
        Ok(())
    }

    #[test]
    fn failed_asset_does_not_retrigger_on_reentry() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let image = FakeImage::new();
        image.push_fail("once");
        let (mut studio, project_id, concept_id) = seeded_studio(temp.path(), image.clone());

        let walk = ConceptWalk::new(project_id, concept_id);
        walk.enter(&mut studio)?;
        walk.enter(&mut studio)?;
        assert_eq!(image.requests().len(), 1);
        Ok(())
    }

    #[test]
    fn forward_navigation_is_gated_backward_is_not() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let (mut studio, project_id, concept_id) = seeded_studio(temp.path(), FakeImage::new());
        let mut walk = ConceptWalk::new(project_id.clone(), concept_id.clone());

        studio.store_for_tests().update_concept(
            &project_id,
            &concept_id,
            &ConceptPatch::logo(AssetState::Failed),
        );
        assert!(!walk.next(&mut studio)?);
        assert!(!walk.jump(&mut studio, 2)?);
        assert_eq!(walk.step_index(), 0);

        studio.store_for_tests().update_concept(
            &project_id,
            &concept_id,
            &ConceptPatch::logo(AssetState::Ready(long_payload())),
        );
        assert!(walk.next(&mut studio)?);
        assert_eq!(walk.step(), Step::Typography);

        assert!(walk.jump(&mut studio, 6)?);
        assert_eq!(walk.step(), Step::Strategy);
        assert!(walk.jump(&mut studio, 0)?);
        Ok(())
    }

    #[test]
    fn switching_concepts_resets_the_walk() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let (mut studio, project_id, concept_id) = seeded_studio(temp.path(), FakeImage::new());
        let mut walk = ConceptWalk::new(project_id.clone(), concept_id.clone());

        studio.store_for_tests().update_concept(
            &project_id,
            &concept_id,
            &ConceptPatch::logo(AssetState::Ready(long_payload())),
        );
        assert!(walk.next(&mut studio)?);
        assert!(walk.step_index() > 0);

        walk.set_concept("concept-9999-1");
        assert_eq!(walk.step_index(), 0);
        Ok(())
    }

    #[test]
    fn mockups_step_proceeds_on_partial_completion() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let (mut studio, project_id, concept_id) = seeded_studio(temp.path(), FakeImage::new());
        let mut walk = ConceptWalk::new(project_id.clone(), concept_id.clone());

        studio.store_for_tests().update_concept(
            &project_id,
            &concept_id,
            &ConceptPatch::logo(AssetState::Ready(long_payload())),
        );
        studio.store_for_tests().update_concept(
            &project_id,
            &concept_id,
            &ConceptPatch::mockup(
                MockupKind::Website,
                AssetState::Pending,
            ),
        );

        assert!(walk.jump(&mut studio, 4)?);
        assert_eq!(walk.step(), Step::Mockups);
        assert!(walk.can_proceed(&studio));
        Ok(())
    }

    #[test]
    fn add_concept_appends_with_an_indexed_id() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let events = test_events(temp.path());
        let store = ProjectStore::open(temp.path(), events.clone());
        let text = FakeText::ok(dryrun_concept_json());
        text.push_ok(dryrun_concept_json());
        let mut studio = Studio::new(store, Box::new(text), Box::new(FakeImage::new()), events);

        let project_id = studio.create_project(nova_input())?;
        let concept_id = studio.add_concept(&project_id)?;

        let project = studio.project(&project_id).expect("project");
        assert_eq!(project.concepts.len(), 2);
        assert_eq!(project.concepts[1].id, concept_id);
        assert!(concept_id.ends_with("-1"));
        assert_eq!(project.status, ProjectStatus::GeneratingImages);
        Ok(())
    }

    #[test]
    fn failed_add_concept_reverts_the_status() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let events = test_events(temp.path());
        let store = ProjectStore::open(temp.path(), events.clone());
        let text = FakeText::ok(dryrun_concept_json());
        text.push_err("text request failed (429): RESOURCE_EXHAUSTED");
        let mut studio = Studio::new(store, Box::new(text), Box::new(FakeImage::new()), events);

        let project_id = studio.create_project(nova_input())?;
        let err = studio.add_concept(&project_id).unwrap_err();
        assert!(is_capacity_error(&err));

        let project = studio.project(&project_id).expect("project");
        assert_eq!(project.concepts.len(), 1);
        assert_eq!(project.status, ProjectStatus::GeneratingImages);
        Ok(())
    }

    #[test]
    fn dryrun_client_is_deterministic() -> Result<()> {
        let client = DryrunClient::new();
        let request = ImageRequest {
            model: PRIMARY_IMAGE_MODEL.to_string(),
            parts: vec![ContentPart::Text("a logo".to_string())],
            image_config: Some(ImageConfig {
                image_size: ImageSize::OneK,
                aspect_ratio: AspectRatio::Square,
            }),
            timeout: IMAGE_TIMEOUT,
        };
        let first = client.generate_image(&request)?;
        let second = client.generate_image(&request)?;
        assert_eq!(first, second);
        let url = extract_image_payload(&first)?;
        assert!(url.starts_with("data:image/png;base64,"));

        let text = client.generate_text(&TextRequest {
            model: TEXT_MODEL.to_string(),
            prompt: String::new(),
            system_instruction: String::new(),
            response_schema: concept_response_schema(),
        })?;
        let concepts = parse_concepts(&text, 7)?;
        assert_eq!(concepts.len(), 1);
        assert_eq!(concepts[0].campaigns.len(), 3);
        Ok(())
    }
}
