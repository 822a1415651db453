//! 广告分析：把跳切帧和转写文本交给多模态模型，得到逐镜头的结构化拆解

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::config::{AnalysisConfig, EncodingConfig};
use crate::error::{ExtractionError, Result};
use crate::frame::{Frame, FrameType};
use crate::transcript::AudioExtraction;

pub const SYSTEM_PROMPT: &str = "You are an expert advertisement analyst. You break short-form video ads \
into shots, identify recurring people, products and locations, and describe what is seen and heard in \
each shot. Always answer with a single valid JSON object and nothing else.";

pub const USER_PROMPT: &str = r#"Analyze this short-form video advertisement shot by shot.

Identify recurring entities (people, products, locations) once in the "entities" section and reference them by id in the chunks.

REQUIRED JSON STRUCTURE:
{
  "id": "string",
  "summary": "one paragraph summary of the ad",
  "visualStyle": "overall visual style",
  "audioStyle": "overall audio style",
  "duration": 0.0,
  "entities": {
    "people": [{"id": "person_1", "role": "presenter|customer|model", "appearance": "...", "demographics": "..."}],
    "products": [{"id": "product_1", "name": "...", "description": "...", "category": "..."}],
    "locations": [{"id": "location_1", "type": "kitchen|studio|outdoor|store", "description": "...", "lighting": "natural|studio|mixed"}]
  },
  "chunks": [
    {
      "id": "chunk_001",
      "type": "hook|body|cta",
      "startTime": 0.0,
      "endTime": 2.5,
      "visual": {
        "subjects": ["person_1", "product_1"],
        "location": "location_1",
        "description": "what happens in this shot",
        "cameraAngle": "camera angle and framing",
        "movement": "camera or subject movement",
        "textOverlay": "on-screen text"
      },
      "audio": {
        "speaker": "person_1|narrator|none",
        "transcript": "words spoken during this shot",
        "tone": "vocal delivery",
        "backgroundMusic": "music during this shot",
        "volume": "low|medium|high"
      }
    }
  ]
}"#;

const DEFAULT_SUMMARY: &str = "Advertisement analysis completed";
const DEFAULT_VISUAL_STYLE: &str = "Standard video production style";
const DEFAULT_AUDIO_STYLE: &str = "Standard audio with speech and background elements";

/// 镜头在广告结构中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Hook,
    Body,
    Cta,
}

impl ChunkKind {
    /// 按位置推断：第一个为 hook，最后一个为 cta，其余为 body
    pub fn for_position(index: usize, total: usize) -> Self {
        if index == 0 {
            ChunkKind::Hook
        } else if index + 1 == total {
            ChunkKind::Cta
        } else {
            ChunkKind::Body
        }
    }
}

/// 接受任意 JSON 值：字符串原样保留，null 为空串，其他值转成文本
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().trim_end_matches('s').parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

fn lenient_kind<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<ChunkKind>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "hook" => Some(ChunkKind::Hook),
            "body" => Some(ChunkKind::Body),
            "cta" => Some(ChunkKind::Cta),
            _ => None,
        },
        _ => None,
    })
}

fn lenient_subjects<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        Value::String(s) if !s.is_empty() => vec![s],
        _ => Vec::new(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkVisual {
    #[serde(default, deserialize_with = "lenient_subjects")]
    pub subjects: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub location: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub camera_angle: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub lighting: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub movement: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text_overlay: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub background: String,
    /// 模型额外返回的字段原样保留
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkAudio {
    #[serde(default, deserialize_with = "lenient_string")]
    pub speaker: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub transcript: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tone: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub background_music: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub volume: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisChunk {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(rename = "type", default, deserialize_with = "lenient_kind")]
    pub kind: Option<ChunkKind>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub start_time: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub end_time: f64,
    #[serde(default)]
    pub visual: ChunkVisual,
    #[serde(default)]
    pub audio: ChunkAudio,
}

/// 广告分析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdAnalysis {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub summary: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub visual_style: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub audio_style: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub duration: f64,
    #[serde(default)]
    pub entities: Value,
    #[serde(default)]
    pub chunks: Vec<AnalysisChunk>,
}

fn fill(field: &mut String, default: &str) {
    if field.trim().is_empty() {
        *field = default.to_string();
    }
}

fn analysis_id(source: &str, prefix: &str) -> String {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    format!(
        "{}_{}_{}",
        prefix,
        chrono::Utc::now().timestamp(),
        hasher.finish() % 10000
    )
}

/// 补全缺失字段，使结果结构完整
pub fn normalize(mut analysis: AdAnalysis, source: &str, duration: f64) -> AdAnalysis {
    if analysis.id.trim().is_empty() {
        analysis.id = analysis_id(source, "ad");
    }
    analysis.url = source.to_string();
    if !(analysis.duration > 0.0) {
        analysis.duration = duration;
    }
    fill(&mut analysis.summary, DEFAULT_SUMMARY);
    fill(&mut analysis.visual_style, DEFAULT_VISUAL_STYLE);
    fill(&mut analysis.audio_style, DEFAULT_AUDIO_STYLE);
    if !analysis.entities.is_object() {
        analysis.entities = Value::Object(Map::new());
    }

    let total = analysis.chunks.len();
    for (i, chunk) in analysis.chunks.iter_mut().enumerate() {
        if chunk.id.trim().is_empty() {
            chunk.id = format!("chunk_{:03}", i + 1);
        }
        if chunk.kind.is_none() {
            chunk.kind = Some(ChunkKind::for_position(i, total));
        }

        let visual = &mut chunk.visual;
        fill(&mut visual.description, "Visual content analysis");
        fill(&mut visual.camera_angle, "standard framing");
        fill(&mut visual.lighting, "standard lighting");
        fill(&mut visual.movement, "minimal camera movement");
        fill(&mut visual.background, "not specified");

        let audio = &mut chunk.audio;
        fill(&mut audio.tone, "conversational");
        fill(&mut audio.background_music, "not specified");
        fill(&mut audio.volume, "medium");
    }

    analysis
}

/// 分析失败时的占位结果
pub fn fallback_analysis(source: &str, duration: f64) -> AdAnalysis {
    AdAnalysis {
        id: analysis_id(source, "ad_fallback"),
        url: source.to_string(),
        summary: "Analysis parsing failed - manual review required".to_string(),
        visual_style: "Unable to determine visual style".to_string(),
        audio_style: "Unable to determine audio style".to_string(),
        duration,
        entities: Value::Object(Map::new()),
        chunks: vec![AnalysisChunk {
            id: "chunk_001".to_string(),
            kind: Some(ChunkKind::Hook),
            start_time: 0.0,
            end_time: duration.min(5.0),
            visual: ChunkVisual {
                description: "Analysis failed - manual review needed".to_string(),
                camera_angle: "unknown".to_string(),
                lighting: "unknown".to_string(),
                movement: "unknown".to_string(),
                background: "unknown".to_string(),
                ..ChunkVisual::default()
            },
            audio: ChunkAudio {
                transcript: "Analysis failed".to_string(),
                tone: "unknown".to_string(),
                background_music: "unknown".to_string(),
                volume: "unknown".to_string(),
                ..ChunkAudio::default()
            },
        }],
    }
}

/// 去掉 `,` 后紧跟 `}` 或 `]` 的多余逗号（字符串内的内容不动）
fn remove_trailing_commas(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// 清理模型返回的文本：去掉代码块标记和前后的说明文字，修正多余逗号
pub fn clean_json_response(text: &str) -> Result<String> {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    let cleaned = cleaned.trim();

    let (start, end) = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => (start, end),
        _ => {
            return Err(ExtractionError::Analysis(
                "响应中没有 JSON 对象".to_string(),
            ))
        }
    };

    let body: String = cleaned[start..=end]
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t' | '\r'))
        .collect();
    Ok(remove_trailing_commas(&body))
}

/// 解析并补全模型的回复
pub fn parse_analysis(text: &str, source: &str, duration: f64) -> Result<AdAnalysis> {
    let cleaned = clean_json_response(text)?;
    let analysis: AdAnalysis = serde_json::from_str(&cleaned)
        .map_err(|e| ExtractionError::Analysis(format!("JSON 解析失败: {}", e)))?;
    Ok(normalize(analysis, source, duration))
}

/// 构建发送给模型的用户消息内容：提示词、视频信息、跳切帧、转写文本、最后的指令
pub fn build_user_content(
    frames: &[&Frame],
    audio: &AudioExtraction,
    source: &str,
    video_length: f64,
    encoding: &EncodingConfig,
) -> Result<Vec<Value>> {
    let mut content = vec![
        json!({"type": "text", "text": USER_PROMPT}),
        json!({
            "type": "text",
            "text": format!(
                "\n\nVIDEO TO ANALYZE:\n- URL: {}\n- Duration: {:.1} seconds\n- Frames: {}\n",
                source,
                video_length,
                frames.len()
            )
        }),
        json!({"type": "text", "text": "\nVIDEO FRAMES (in chronological order):"}),
    ];

    for (i, frame) in frames.iter().enumerate() {
        content.push(json!({
            "type": "text",
            "text": format!(
                "\nFrame {} - Timestamp: {:.2}s (Duration: {:.2}s, Type: {})",
                i + 1,
                frame.timestamp,
                frame.duration.unwrap_or(0.0),
                frame.frame_type
            )
        }));
        let data_uri = frame.encode_data_uri(encoding)?;
        debug!("🖼️  [广告分析] 第 {} 帧编码完成 ({} 字符)", i + 1, data_uri.len());
        content.push(json!({"type": "image_url", "image_url": {"url": data_uri}}));
    }

    content.push(json!({
        "type": "text",
        "text": format!(
            "\n\nAUDIO TRANSCRIPT:\nFull transcript: {}\n\nSegmented transcript:",
            audio.full_transcript
        )
    }));
    for segment in &audio.transcript_segments {
        content.push(json!({
            "type": "text",
            "text": format!("\n[{:.1}s - {:.1}s]: {}", segment.start, segment.end, segment.text)
        }));
    }
    content.push(json!({
        "type": "text",
        "text": format!(
            "\n\nAnalyze and return structured JSON with entities and {} chunks - one per frame.",
            frames.len()
        )
    }));

    Ok(content)
}

/// 多模态模型调用
#[async_trait]
pub trait SceneAnalyzer: Send + Sync {
    /// 提交系统提示词和用户内容，返回模型的原始文本回复
    async fn complete(&self, system_prompt: &str, content: Vec<Value>) -> Result<String>;
}

/// OpenAI 兼容的 chat completions 客户端
pub struct OpenAiAnalyzer {
    client: reqwest::Client,
    config: AnalysisConfig,
    api_key: String,
}

impl OpenAiAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ExtractionError::Analysis("未配置 OPENAI_API_KEY".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExtractionError::Analysis(format!("创建 HTTP 客户端失败: {}", e)))?;
        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl SceneAnalyzer for OpenAiAnalyzer {
    async fn complete(&self, system_prompt: &str, content: Vec<Value>) -> Result<String> {
        let body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": content}
            ]
        });

        let url = format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExtractionError::Analysis(format!("请求失败: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Analysis(format!("API 返回 {}: {}", status, text)));
        }

        let reply: Value = response
            .json()
            .await
            .map_err(|e| ExtractionError::Analysis(format!("解析响应失败: {}", e)))?;
        reply["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| ExtractionError::Analysis("响应中没有消息内容".to_string()))
    }
}

/// 分析广告：只发送跳切帧，没有跳切帧时（均匀间隔回退）发送全部帧；任何失败都返回占位结果
pub async fn analyze_advertisement(
    analyzer: &dyn SceneAnalyzer,
    frames: &[Frame],
    audio: &AudioExtraction,
    source: &str,
    video_length: f64,
    encoding: &EncodingConfig,
) -> AdAnalysis {
    let start = Instant::now();
    let mut jump_cuts: Vec<&Frame> = frames
        .iter()
        .filter(|f| f.frame_type == FrameType::JumpCut)
        .collect();
    if jump_cuts.is_empty() {
        jump_cuts = frames.iter().collect();
    }
    jump_cuts.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    info!(
        "🤖 [广告分析] 发送 {} 个帧, {} 个转写片段",
        jump_cuts.len(),
        audio.transcript_segments.len()
    );

    let content = match build_user_content(&jump_cuts, audio, source, video_length, encoding) {
        Ok(content) => content,
        Err(e) => {
            error!("❌ [广告分析] 构建请求失败: {}", e);
            return fallback_analysis(source, video_length);
        }
    };

    let reply = match analyzer.complete(SYSTEM_PROMPT, content).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("❌ [广告分析] 模型调用失败: {}", e);
            return fallback_analysis(source, video_length);
        }
    };

    match parse_analysis(&reply, source, video_length) {
        Ok(analysis) => {
            info!(
                "✅ [广告分析] 完成: {} 个镜头, 耗时: {:.2}秒",
                analysis.chunks.len(),
                start.elapsed().as_secs_f64()
            );
            analysis
        }
        Err(e) => {
            let preview: String = reply.chars().take(500).collect();
            warn!("⚠️  [广告分析] 回复解析失败: {}; 预览: {}", e, preview);
            fallback_analysis(source, video_length)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::TranscriptSegment;
    use std::sync::Mutex;

    fn frame(timestamp: f64, frame_type: FrameType) -> Frame {
        let mut frame = Frame::new(
            image::RgbImage::from_pixel(64, 36, image::Rgb([200, 40, 40])),
            timestamp,
            frame_type,
        );
        frame.duration = Some(1.0);
        frame
    }

    fn audio() -> AudioExtraction {
        AudioExtraction::from_segments(
            6.0,
            vec![TranscriptSegment {
                start: 0.0,
                end: 6.0,
                text: "Try it today".to_string(),
                confidence: Some(-0.2),
            }],
        )
    }

    struct Canned {
        reply: std::result::Result<String, String>,
        seen: Mutex<Vec<Value>>,
    }

    impl Canned {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SceneAnalyzer for Canned {
        async fn complete(&self, _system_prompt: &str, content: Vec<Value>) -> Result<String> {
            self.seen.lock().unwrap().extend(content);
            self.reply
                .clone()
                .map_err(ExtractionError::Analysis)
        }
    }

    #[test]
    fn test_clean_strips_fences_and_prose() {
        let raw = "```json\nHere you go: {\"summary\": \"ok\", \"chunks\": [1, 2,],}\nthanks\n```";
        let cleaned = clean_json_response(raw).unwrap();
        assert_eq!(cleaned, "{\"summary\": \"ok\", \"chunks\": [1, 2]}");
    }

    #[test]
    fn test_clean_keeps_commas_inside_strings() {
        let cleaned = clean_json_response(r#"{"text": "a, }", "n": 1}"#).unwrap();
        assert_eq!(cleaned, r#"{"text": "a, }", "n": 1}"#);
    }

    #[test]
    fn test_clean_without_object_fails() {
        assert!(clean_json_response("I could not analyze this video.").is_err());
    }

    #[test]
    fn test_normalize_fills_defaults() {
        let raw = r#"{
            "summary": "",
            "duration": 0,
            "chunks": [
                {"startTime": 0, "endTime": 2.5, "visual": {"description": "Close-up of sneaker"}},
                {"type": "product-demo", "startTime": "2.5", "endTime": 5, "audio": {"transcript": "so light", "tone": null}},
                {"id": "custom", "type": "CTA", "startTime": 5, "endTime": 8}
            ]
        }"#;
        let analysis = parse_analysis(raw, "ad.mp4", 8.0).unwrap();

        assert!(analysis.id.starts_with("ad_"));
        assert_eq!(analysis.url, "ad.mp4");
        assert_eq!(analysis.duration, 8.0);
        assert_eq!(analysis.summary, DEFAULT_SUMMARY);
        assert!(analysis.entities.is_object());

        let ids: Vec<&str> = analysis.chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["chunk_001", "chunk_002", "custom"]);
        let kinds: Vec<ChunkKind> = analysis.chunks.iter().map(|c| c.kind.unwrap()).collect();
        assert_eq!(kinds, vec![ChunkKind::Hook, ChunkKind::Body, ChunkKind::Cta]);

        assert_eq!(analysis.chunks[0].visual.description, "Close-up of sneaker");
        assert_eq!(analysis.chunks[0].visual.camera_angle, "standard framing");
        assert_eq!(analysis.chunks[1].start_time, 2.5);
        assert_eq!(analysis.chunks[1].audio.transcript, "so light");
        assert_eq!(analysis.chunks[1].audio.tone, "conversational");
    }

    #[test]
    fn test_extra_fields_preserved() {
        let raw = r#"{"chunks": [{"visual": {"action": "pours coffee"}}]}"#;
        let analysis = parse_analysis(raw, "ad.mp4", 4.0).unwrap();
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["chunks"][0]["visual"]["action"], "pours coffee");
        assert_eq!(json["chunks"][0]["type"], "hook");
        assert_eq!(json["visualStyle"], DEFAULT_VISUAL_STYLE);
    }

    #[test]
    fn test_fallback_shape() {
        let analysis = fallback_analysis("clip.mp4", 3.0);
        assert!(analysis.id.starts_with("ad_fallback_"));
        assert_eq!(analysis.chunks.len(), 1);
        assert_eq!(analysis.chunks[0].end_time, 3.0);
        assert_eq!(analysis.chunks[0].kind, Some(ChunkKind::Hook));
    }

    #[tokio::test]
    async fn test_only_jump_cut_frames_are_sent() {
        let frames = vec![
            frame(3.0, FrameType::JumpCut),
            frame(1.0, FrameType::SceneInterval),
            frame(0.0, FrameType::JumpCut),
        ];
        let analyzer = Canned::ok(r#"{"summary": "Sneaker ad", "chunks": [{}, {}]}"#);
        let analysis = analyze_advertisement(
            &analyzer,
            &frames,
            &audio(),
            "ad.mp4",
            6.0,
            &EncodingConfig::default(),
        )
        .await;

        assert_eq!(analysis.summary, "Sneaker ad");
        let seen = analyzer.seen.lock().unwrap();
        let images = seen.iter().filter(|c| c["type"] == "image_url").count();
        assert_eq!(images, 2);
        let captions: Vec<&str> = seen
            .iter()
            .filter_map(|c| c["text"].as_str())
            .filter(|t| t.starts_with("\nFrame "))
            .collect();
        assert!(captions[0].contains("Timestamp: 0.00s"));
        assert!(captions[1].contains("Timestamp: 3.00s"));
        assert!(seen
            .iter()
            .any(|c| c["text"].as_str() == Some("\n[0.0s - 6.0s]: Try it today")));
    }

    #[tokio::test]
    async fn test_interval_frames_sent_when_no_jump_cuts() {
        let frames: Vec<Frame> = [4.0, 1.0, 2.0, 3.0]
            .into_iter()
            .map(|t| frame(t, FrameType::Interval))
            .collect();
        let analyzer = Canned::ok(r#"{"summary": "Static ad", "chunks": [{}]}"#);
        let analysis = analyze_advertisement(
            &analyzer,
            &frames,
            &audio(),
            "ad.mp4",
            5.0,
            &EncodingConfig::default(),
        )
        .await;

        assert_eq!(analysis.summary, "Static ad");
        let seen = analyzer.seen.lock().unwrap();
        let images = seen.iter().filter(|c| c["type"] == "image_url").count();
        assert_eq!(images, 4);
        let captions: Vec<&str> = seen
            .iter()
            .filter_map(|c| c["text"].as_str())
            .filter(|t| t.starts_with("\nFrame "))
            .collect();
        assert_eq!(captions.len(), 4);
        assert!(captions[0].contains("Timestamp: 1.00s"));
        assert!(captions[3].contains("Type: interval"));
        assert!(seen
            .iter()
            .any(|c| c["text"].as_str().is_some_and(|t| t.contains("- Frames: 4"))));
    }

    #[tokio::test]
    async fn test_failures_return_fallback() {
        let frames = vec![frame(0.0, FrameType::JumpCut)];
        let failing = Canned {
            reply: Err("timeout".to_string()),
            seen: Mutex::new(Vec::new()),
        };
        let analysis =
            analyze_advertisement(&failing, &frames, &audio(), "ad.mp4", 6.0, &EncodingConfig::default()).await;
        assert!(analysis.id.starts_with("ad_fallback_"));

        let garbage = Canned::ok("sorry, no json here");
        let analysis =
            analyze_advertisement(&garbage, &frames, &audio(), "ad.mp4", 6.0, &EncodingConfig::default()).await;
        assert_eq!(analysis.summary, "Analysis parsing failed - manual review required");
    }
}
