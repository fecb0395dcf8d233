//! Consultation prompt composition.
//!
//! A [`ConsultationPrompt`] is assembled through a typed builder so that a
//! missing slot is reported as a [`PromptCompositionError`] before any call
//! to the language model. [`PromptTemplate::render`] then lays the slots out
//! in a fixed section order:
//!
//! 1. role and tone
//! 2. the request fields
//! 3. grounding instruction
//! 4. retrieved context
//! 5. answer form (risk, contagiousness, first aid, home care, urgency)
//! 6. disclaimer
//! 7. no-markup instruction

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PromptCompositionError;
use crate::request::ConsultationRequest;

/// A named slot of the consultation template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptSlot {
    /// Predicted disease / topic name.
    DiseaseName,
    /// Whether the patient has a fever.
    FeverStatus,
    /// Whether the lesion is bleeding.
    BloodingStatus,
    /// Patient age in years.
    Age,
    /// Free-text symptom description.
    Symptoms,
    /// Retrieved reference evidence.
    Context,
}

impl PromptSlot {
    /// Every slot, in template order.
    pub const ALL: [PromptSlot; 6] = [
        Self::DiseaseName,
        Self::FeverStatus,
        Self::BloodingStatus,
        Self::Age,
        Self::Symptoms,
        Self::Context,
    ];

    /// The slot's template name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DiseaseName => "disease_name",
            Self::FeverStatus => "fever_status",
            Self::BloodingStatus => "blooding_status",
            Self::Age => "age",
            Self::Symptoms => "symptoms",
            Self::Context => "context",
        }
    }
}

impl fmt::Display for PromptSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fully substituted slots of one consultation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsultationPrompt {
    disease_name: String,
    fever_status: bool,
    blooding_status: bool,
    age: u32,
    symptoms: String,
    context: String,
}

impl ConsultationPrompt {
    /// Create a new [`ConsultationPromptBuilder`].
    pub fn builder() -> ConsultationPromptBuilder {
        ConsultationPromptBuilder::default()
    }

    /// The disease name slot.
    pub fn disease_name(&self) -> &str {
        &self.disease_name
    }

    /// The context slot.
    pub fn context(&self) -> &str {
        &self.context
    }
}

/// Builder for [`ConsultationPrompt`]. Every slot is mandatory.
#[derive(Debug, Clone, Default)]
pub struct ConsultationPromptBuilder {
    disease_name: Option<String>,
    fever_status: Option<bool>,
    blooding_status: Option<bool>,
    age: Option<u32>,
    symptoms: Option<String>,
    context: Option<String>,
}

impl ConsultationPromptBuilder {
    /// Fill the five request slots from a [`ConsultationRequest`].
    pub fn request(self, request: &ConsultationRequest) -> Self {
        self.disease_name(request.disease_name.clone())
            .fever_status(request.fever_status)
            .blooding_status(request.blooding_status)
            .age(request.age)
            .symptoms(request.symptoms.clone())
    }

    /// Set the disease name.
    pub fn disease_name(mut self, name: impl Into<String>) -> Self {
        self.disease_name = Some(name.into());
        self
    }

    /// Set the fever status.
    pub fn fever_status(mut self, fever: bool) -> Self {
        self.fever_status = Some(fever);
        self
    }

    /// Set the bleeding status.
    pub fn blooding_status(mut self, blooding: bool) -> Self {
        self.blooding_status = Some(blooding);
        self
    }

    /// Set the age.
    pub fn age(mut self, age: u32) -> Self {
        self.age = Some(age);
        self
    }

    /// Set the symptom description.
    pub fn symptoms(mut self, symptoms: impl Into<String>) -> Self {
        self.symptoms = Some(symptoms.into());
        self
    }

    /// Set the retrieved context.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Build the prompt.
    ///
    /// # Errors
    ///
    /// Returns [`PromptCompositionError::MissingSlot`] for the first slot (in
    /// template order) that is unset, or blank for text slots.
    pub fn build(self) -> Result<ConsultationPrompt, PromptCompositionError> {
        Ok(ConsultationPrompt {
            disease_name: required_text(self.disease_name, PromptSlot::DiseaseName)?,
            fever_status: self
                .fever_status
                .ok_or(PromptCompositionError::MissingSlot(PromptSlot::FeverStatus))?,
            blooding_status: self
                .blooding_status
                .ok_or(PromptCompositionError::MissingSlot(PromptSlot::BloodingStatus))?,
            age: self.age.ok_or(PromptCompositionError::MissingSlot(PromptSlot::Age))?,
            symptoms: required_text(self.symptoms, PromptSlot::Symptoms)?,
            context: required_text(self.context, PromptSlot::Context)?,
        })
    }
}

fn required_text(
    value: Option<String>,
    slot: PromptSlot,
) -> Result<String, PromptCompositionError> {
    value.filter(|v| !v.trim().is_empty()).ok_or(PromptCompositionError::MissingSlot(slot))
}

/// Language of the template wording. The section structure is identical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptLanguage {
    /// Korean wording.
    #[default]
    Korean,
    /// English wording.
    English,
}

impl FromStr for PromptLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ko" | "kr" | "korean" => Ok(Self::Korean),
            "en" | "english" => Ok(Self::English),
            other => Err(format!("unsupported prompt language '{other}'")),
        }
    }
}

struct Wording {
    preamble: &'static str,
    labels: [&'static str; 5],
    grounding: &'static str,
    context_label: &'static str,
    answer_form_label: &'static str,
    /// `{disease}` is replaced with the disease name.
    opening: &'static str,
    sections: [&'static str; 5],
    disclaimer: &'static str,
    cautions_label: &'static str,
    no_markup: &'static str,
}

const KOREAN: Wording = Wording {
    preamble: "당신은 피부과 의료 전문가입니다. 아래 정보를 바탕으로 정확한 의료 설명을 제공하세요. \
               의료 지식이 없는 일반인도 이해할 수 있도록 쉽고 간단하게, 부드러운 말투로 작성하세요.",
    labels: ["질환명", "발열 여부", "출혈 여부", "나이", "증상"],
    grounding: "반드시 아래 컨텍스트에 제공된 정보만 사용하여 답변하세요. \
                컨텍스트에 없는 내용은 추측하거나 덧붙이지 마세요.",
    context_label: "컨텍스트",
    answer_form_label: "답변 양식",
    opening: "선택한 사진을 바탕으로 예측한 피부 질환은 {disease}입니다. \
              아래 내용은 예측한 진단명과 입력하신 증상 및 정보를 토대로 작성한 답변입니다.",
    sections: ["위험성", "전염성", "응급 처치 방법", "가정 내 조치 방법", "병원 방문 필요의 긴급성"],
    disclaimer: "이 답변은 예측한 질환에 대한 의료 건강정보를 참고하여 작성되었습니다. \
                 참고용으로 활용하시고, 가능하면 병원을 방문해 주세요.",
    cautions_label: "답변 작성 시 주의사항",
    no_markup: "각 항목에 * 나 - 같은 기호나 마크다운 서식을 사용하지 마세요.",
};

const ENGLISH: Wording = Wording {
    preamble: "You are a dermatology medical expert. Give an accurate medical explanation based on \
               the information below. Write simply and gently so that a reader without medical \
               knowledge can understand it.",
    labels: ["Condition", "Fever", "Bleeding", "Age", "Symptoms"],
    grounding: "Answer only with information provided in the context below. Do not guess or add \
                anything the context does not contain.",
    context_label: "Context",
    answer_form_label: "Answer form",
    opening: "Based on the selected photo, the predicted skin condition is {disease}. The answer \
              below is based on the predicted diagnosis and the symptoms and details you entered.",
    sections: [
        "Risk level",
        "Contagiousness",
        "First aid",
        "Home care",
        "Urgency of seeing a doctor",
    ],
    disclaimer: "This answer was written with reference health information about the predicted \
                 condition. Use it for reference only and visit a clinic whenever possible.",
    cautions_label: "Cautions when writing the answer",
    no_markup: "Do not use symbols such as * or - or any markdown formatting in any section.",
};

/// A prompt ready for the language model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt(String);

impl ComposedPrompt {
    /// The prompt text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the prompt text.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ComposedPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The fixed consultation template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromptTemplate {
    language: PromptLanguage,
}

impl PromptTemplate {
    /// Create a template in the given language.
    pub fn new(language: PromptLanguage) -> Self {
        Self { language }
    }

    /// The template language.
    pub fn language(&self) -> PromptLanguage {
        self.language
    }

    /// Titles of the five answer sections, in order.
    pub fn section_titles(&self) -> [&'static str; 5] {
        self.wording().sections
    }

    fn wording(&self) -> &'static Wording {
        match self.language {
            PromptLanguage::Korean => &KOREAN,
            PromptLanguage::English => &ENGLISH,
        }
    }

    /// Substitute `prompt` into the template.
    pub fn render(&self, prompt: &ConsultationPrompt) -> ComposedPrompt {
        let w = self.wording();
        let values = [
            prompt.disease_name.clone(),
            prompt.fever_status.to_string(),
            prompt.blooding_status.to_string(),
            prompt.age.to_string(),
            prompt.symptoms.clone(),
        ];

        let mut out = String::with_capacity(1024 + prompt.context.len());
        out.push_str(w.preamble);
        out.push_str("\n\n");
        for (label, value) in w.labels.iter().zip(&values) {
            out.push_str(&format!("{label}: {value}\n"));
        }
        out.push('\n');
        out.push_str(w.grounding);
        out.push_str("\n\n");
        out.push_str(&format!("{}:\n{}\n\n", w.context_label, prompt.context));
        out.push_str(&format!("{}:\n", w.answer_form_label));
        out.push_str(&w.opening.replace("{disease}", &prompt.disease_name));
        out.push_str("\n\n");
        for (number, title) in w.sections.iter().enumerate() {
            out.push_str(&format!("{}. {title}\n\n", number + 1));
        }
        out.push_str(w.disclaimer);
        out.push_str("\n\n");
        out.push_str(&format!("{}:\n{}\n", w.cautions_label, w.no_markup));

        ComposedPrompt(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_builder() -> ConsultationPromptBuilder {
        ConsultationPrompt::builder()
            .disease_name("atopic_dermatitis")
            .fever_status(false)
            .blooding_status(true)
            .age(30)
            .symptoms("itchy red patches")
            .context("Atopic dermatitis causes itching and redness.")
    }

    #[test]
    fn rendered_prompt_contains_every_slot_value() {
        for language in [PromptLanguage::Korean, PromptLanguage::English] {
            let prompt = full_builder().build().unwrap();
            let rendered = PromptTemplate::new(language).render(&prompt);
            let text = rendered.as_str();

            assert!(text.contains("atopic_dermatitis"));
            assert!(text.contains("false"));
            assert!(text.contains("true"));
            assert!(text.contains("30"));
            assert!(text.contains("itchy red patches"));
            assert!(text.contains("Atopic dermatitis causes itching and redness."));
        }
    }

    #[test]
    fn answer_sections_appear_in_fixed_order() {
        for language in [PromptLanguage::Korean, PromptLanguage::English] {
            let template = PromptTemplate::new(language);
            let text = template.render(&full_builder().build().unwrap()).into_string();

            let positions: Vec<usize> = template
                .section_titles()
                .iter()
                .enumerate()
                .map(|(i, title)| text.find(&format!("{}. {title}", i + 1)).unwrap())
                .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");

            let context_at = text.find("Atopic dermatitis causes").unwrap();
            assert!(context_at < positions[0]);
        }
    }

    #[test]
    fn grounding_precedes_context_and_no_markup_closes_the_prompt() {
        for language in [PromptLanguage::Korean, PromptLanguage::English] {
            let template = PromptTemplate::new(language);
            let w = template.wording();
            let text = template.render(&full_builder().build().unwrap()).into_string();

            let grounding_at = text.find(w.grounding).unwrap();
            let context_at = text.find("Atopic dermatitis causes").unwrap();
            let last_section = format!("5. {}", w.sections[4]);
            let last_section_at = text.find(&last_section).unwrap();
            let no_markup_at = text.find(w.no_markup).unwrap();

            assert!(grounding_at < context_at, "{language:?}");
            assert!(last_section_at < no_markup_at, "{language:?}");
            assert!(text.trim_end().ends_with(w.no_markup), "{language:?}");
        }
    }

    #[test]
    fn missing_slots_are_reported_by_name() {
        let err = ConsultationPrompt::builder()
            .disease_name("acne")
            .fever_status(false)
            .blooding_status(false)
            .age(20)
            .symptoms("spots")
            .build()
            .unwrap_err();
        assert_eq!(err, PromptCompositionError::MissingSlot(PromptSlot::Context));

        let err = ConsultationPrompt::builder().build().unwrap_err();
        assert_eq!(err, PromptCompositionError::MissingSlot(PromptSlot::DiseaseName));
    }

    #[test]
    fn blank_text_slots_count_as_missing() {
        let err = full_builder().symptoms("   ").build().unwrap_err();
        assert_eq!(err, PromptCompositionError::MissingSlot(PromptSlot::Symptoms));
    }

    #[test]
    fn builder_fills_request_slots() {
        let request = ConsultationRequest {
            disease_name: "psoriasis".into(),
            fever_status: true,
            blooding_status: false,
            age: 45,
            symptoms: "scaly plaques".into(),
        };
        let prompt =
            ConsultationPrompt::builder().request(&request).context("evidence").build().unwrap();
        assert_eq!(prompt.disease_name(), "psoriasis");
        assert_eq!(prompt.context(), "evidence");
    }

    #[test]
    fn language_parses_short_codes() {
        assert_eq!("ko".parse::<PromptLanguage>().unwrap(), PromptLanguage::Korean);
        assert_eq!("English".parse::<PromptLanguage>().unwrap(), PromptLanguage::English);
        assert!("fr".parse::<PromptLanguage>().is_err());
    }
}
