//! The individual pipeline stages. Each stage renders its prompt from a typed
//! view, calls the model with its fixed role and schema, and parses the reply.
//! Parse failures are returned unchanged; nothing here retries.

use serde::Serialize;
use tracing::debug;

use super::types::{
    Competency, CompetencyList, CompetencySummary, CoverageAssessment, CoverageEntry,
    EvidenceDraft, EvidenceSummary, FitnessVerdict, StyleProfile,
};
use crate::error::PipelineError;
use crate::llm::{ModelGateway, ModelRole};
use crate::prompts::{PromptLibrary, TemplateId};
use crate::schema::{describe, StageOutput};
use crate::skills::SkillRecord;

/// What every stage needs: both gateways and the compiled prompts.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub classifier: &'a ModelGateway,
    pub writer: &'a ModelGateway,
    pub prompts: &'a PromptLibrary,
}

impl<'a> StageContext<'a> {
    fn gateway(&self, role: ModelRole) -> &'a ModelGateway {
        match role {
            ModelRole::Classifier => self.classifier,
            ModelRole::Writer => self.writer,
        }
    }
}

#[derive(Debug, Serialize)]
struct SkillView<'a> {
    category: &'a str,
    competence: &'a str,
    note: &'a str,
    evidence: String,
}

impl<'a> SkillView<'a> {
    fn new(record: &'a SkillRecord) -> Self {
        Self {
            category: &record.category,
            competence: &record.competence,
            note: &record.note,
            evidence: record.evidence_text(),
        }
    }
}

#[derive(Serialize)]
struct SkillOnlyView<'a> {
    skill: SkillView<'a>,
}

#[derive(Serialize)]
struct StyleSystemView<'a> {
    sample_count: usize,
    skills: Vec<SkillView<'a>>,
}

#[derive(Serialize)]
struct StyleUserView<'a> {
    samples: &'a [String],
}

#[derive(Serialize)]
struct SummaryView<'a> {
    skill: SkillView<'a>,
    competencies: &'a [Competency],
}

/// One section of the synthesis prompt. Exactly one slot is set; the
/// template picks the block to render from whichever is non-null.
#[derive(Default, Serialize)]
struct WriteSectionView<'a> {
    competencies: Option<&'a [Competency]>,
    coverage: Option<&'a [CoverageEntry]>,
    summaries: Option<&'a [CompetencySummary]>,
}

impl<'a> From<SynthesisSection<'a>> for WriteSectionView<'a> {
    fn from(section: SynthesisSection<'a>) -> Self {
        match section {
            SynthesisSection::Competencies(list) => Self {
                competencies: Some(list),
                ..Self::default()
            },
            SynthesisSection::Coverage(list) => Self {
                coverage: Some(list),
                ..Self::default()
            },
            SynthesisSection::Summaries(list) => Self {
                summaries: Some(list),
                ..Self::default()
            },
        }
    }
}

#[derive(Serialize)]
struct WriteView<'a> {
    title: &'a str,
    skill: SkillView<'a>,
    style: &'a StyleProfile,
    sections: Vec<WriteSectionView<'a>>,
}

/// An earlier stage output merged into the synthesis prompt.
#[derive(Debug, Clone, Copy)]
pub enum SynthesisSection<'a> {
    Competencies(&'a [Competency]),
    Coverage(&'a [CoverageEntry]),
    Summaries(&'a [CompetencySummary]),
}

/// Everything synthesis consumes. Sections appear in the prompt in the
/// order given here.
#[derive(Debug, Clone)]
pub struct SynthesisInputs<'a> {
    pub style: &'a StyleProfile,
    pub sections: Vec<SynthesisSection<'a>>,
}

async fn run_stage<T: StageOutput>(
    ctx: &StageContext<'_>,
    role: ModelRole,
    instructions: &str,
    user_content: &str,
) -> Result<T, PipelineError> {
    let schema = describe(T::SCHEMA);
    let raw = ctx
        .gateway(role)
        .send(instructions, user_content, Some(&schema))
        .await?;
    if raw.trim().is_empty() {
        return Err(PipelineError::MalformedOutput {
            schema: schema.name().to_string(),
            reason: "empty response".to_string(),
        });
    }
    debug!(schema = %schema.name(), "Parsing {} bytes of model output", raw.len());
    schema.parse(&raw)
}

/// Does `query` demonstrate the record's competency?
pub async fn classify_fitness(
    ctx: &StageContext<'_>,
    record: &SkillRecord,
    query: &str,
) -> Result<FitnessVerdict, PipelineError> {
    let instructions = ctx.prompts.render(
        TemplateId::FitnessSystem,
        &SkillOnlyView {
            skill: SkillView::new(record),
        },
    )?;
    run_stage(ctx, ModelRole::Classifier, &instructions, query).await
}

/// Normalized evidence texts of `records`, skipping empty ones.
pub fn style_samples(records: &[SkillRecord]) -> Vec<String> {
    records
        .iter()
        .map(SkillRecord::evidence_text)
        .filter(|text| !text.is_empty())
        .collect()
}

/// One style profile for all `records`. The call is made even when no record
/// has evidence text.
pub async fn analyze_style(
    ctx: &StageContext<'_>,
    records: &[SkillRecord],
) -> Result<StyleProfile, PipelineError> {
    let samples = style_samples(records);
    let instructions = ctx.prompts.render(
        TemplateId::StyleSystem,
        &StyleSystemView {
            sample_count: samples.len(),
            skills: records.iter().map(SkillView::new).collect(),
        },
    )?;
    let user = ctx
        .prompts
        .render(TemplateId::StyleUser, &StyleUserView { samples: &samples })?;
    run_stage(ctx, ModelRole::Classifier, &instructions, &user).await
}

pub async fn extract_competencies(
    ctx: &StageContext<'_>,
    record: &SkillRecord,
) -> Result<CompetencyList, PipelineError> {
    let instructions = ctx.prompts.render(
        TemplateId::CompetenciesSystem,
        &SkillOnlyView {
            skill: SkillView::new(record),
        },
    )?;
    run_stage(
        ctx,
        ModelRole::Classifier,
        &instructions,
        &record.evidence_text(),
    )
    .await
}

/// Coverage ids come from this call's own analysis and need not match a
/// separate [`extract_competencies`] result.
pub async fn detect_coverage(
    ctx: &StageContext<'_>,
    record: &SkillRecord,
) -> Result<CoverageAssessment, PipelineError> {
    let instructions = ctx.prompts.render(
        TemplateId::CoverageSystem,
        &SkillOnlyView {
            skill: SkillView::new(record),
        },
    )?;
    run_stage(
        ctx,
        ModelRole::Classifier,
        &instructions,
        &record.evidence_text(),
    )
    .await
}

/// What the record's existing evidence already shows per competency.
pub async fn summarize_evidence(
    ctx: &StageContext<'_>,
    record: &SkillRecord,
    competencies: &[Competency],
) -> Result<EvidenceSummary, PipelineError> {
    let instructions = ctx.prompts.render(
        TemplateId::SummarySystem,
        &SummaryView {
            skill: SkillView::new(record),
            competencies,
        },
    )?;
    run_stage(
        ctx,
        ModelRole::Classifier,
        &instructions,
        &record.evidence_text(),
    )
    .await
}

/// Final write-up. The user content is the review text, not the record's note.
pub async fn synthesize_evidence(
    ctx: &StageContext<'_>,
    record: &SkillRecord,
    title: &str,
    review: &str,
    inputs: SynthesisInputs<'_>,
) -> Result<EvidenceDraft, PipelineError> {
    let instructions = ctx.prompts.render(
        TemplateId::WriteSystem,
        &WriteView {
            title,
            skill: SkillView::new(record),
            style: inputs.style,
            sections: inputs.sections.into_iter().map(Into::into).collect(),
        },
    )?;
    run_stage(ctx, ModelRole::Writer, &instructions, review).await
}

/// Free-form Markdown analysis of one record. No output schema.
pub async fn describe_skill(
    ctx: &StageContext<'_>,
    record: &SkillRecord,
) -> Result<String, PipelineError> {
    let view = SkillOnlyView {
        skill: SkillView::new(record),
    };
    let instructions = ctx.prompts.render(TemplateId::DescribeSystem, &view)?;
    let user = ctx.prompts.render(TemplateId::DescribeUser, &view)?;
    let text = ctx
        .gateway(ModelRole::Classifier)
        .send(&instructions, &user, None)
        .await?;
    if text.trim().is_empty() {
        return Err(PipelineError::MalformedOutput {
            schema: "text".to_string(),
            reason: "empty response".to_string(),
        });
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::schema::SchemaName;
    use std::sync::Arc;

    struct Fixture {
        client: Arc<MockLlmClient>,
        classifier: ModelGateway,
        writer: ModelGateway,
        prompts: PromptLibrary,
    }

    impl Fixture {
        fn new(client: MockLlmClient) -> Self {
            let client = Arc::new(client);
            Self {
                classifier: ModelGateway::new(client.clone(), "small", ModelRole::Classifier),
                writer: ModelGateway::new(client.clone(), "large", ModelRole::Writer),
                prompts: PromptLibrary::builtin().unwrap(),
                client,
            }
        }

        fn ctx(&self) -> StageContext<'_> {
            StageContext {
                classifier: &self.classifier,
                writer: &self.writer,
                prompts: &self.prompts,
            }
        }
    }

    fn record() -> SkillRecord {
        SkillRecord::new("Dev", "API design", "Built a REST API\r\n\r\nin Go.")
    }

    #[tokio::test]
    async fn test_classify_fitness_uses_query_as_user_content() {
        let fx = Fixture::new(MockLlmClient::with_responder(|_| {
            Ok(r#"{"fit":"fit","reason":"REST API"}"#.to_string())
        }));
        let verdict = classify_fitness(&fx.ctx(), &record(), "I shipped a REST API.")
            .await
            .unwrap();
        assert_eq!(verdict.reason, "REST API");

        let requests = fx.client.requests();
        assert_eq!(requests[0].model, "small");
        assert_eq!(requests[0].user_content, "I shipped a REST API.");
        assert!(requests[0].instructions.contains("Competence: API design"));
        assert!(requests[0]
            .instructions
            .contains("Existing evidence: Built a REST API in Go."));
    }

    #[tokio::test]
    async fn test_empty_response_is_malformed() {
        let fx = Fixture::new(MockLlmClient::with_responder(|_| Ok("  \n".to_string())));
        let err = classify_fitness(&fx.ctx(), &record(), "x").await.unwrap_err();
        assert_eq!(err.kind(), "malformed_output");
    }

    #[test]
    fn test_style_samples_skip_empty_notes() {
        let records = vec![
            SkillRecord::new("Dev", "Migration", "Led migration.\n\nDeployed daily."),
            SkillRecord::new("Ops", "Monitoring", ""),
        ];
        assert_eq!(
            style_samples(&records),
            vec!["Led migration. Deployed daily.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_analyze_style_one_sample_one_call() {
        let fx = Fixture::new(MockLlmClient::new());
        let records = vec![
            SkillRecord::new("Dev", "Migration", "Led migration.\n\nDeployed daily."),
            SkillRecord::new("Ops", "Monitoring", ""),
        ];
        assert_eq!(
            style_samples(&records),
            vec!["Led migration. Deployed daily.".to_string()]
        );

        analyze_style(&fx.ctx(), &records).await.unwrap();

        let requests = fx.client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].user_content,
            "EVIDENCE SAMPLES\n1. Led migration. Deployed daily.\n"
        );
        assert!(requests[0].instructions.contains("lists 1 evidence sample(s)"));
        assert!(requests[0].instructions.contains("- Dev / Migration\n- Ops / Monitoring\n"));
        assert_eq!(
            requests[0].schema.as_ref().map(|s| s.name()),
            Some(SchemaName::StyleResult)
        );
    }

    #[tokio::test]
    async fn test_analyze_style_without_samples_still_calls() {
        let fx = Fixture::new(MockLlmClient::new());
        let records = vec![SkillRecord::new("Ops", "Monitoring", "   ")];
        let style = analyze_style(&fx.ctx(), &records).await.unwrap();
        assert_eq!(style.language, "unknown");

        let requests = fx.client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].user_content.trim(), "EVIDENCE SAMPLES");
        assert!(requests[0].instructions.contains("lists 0 evidence sample(s)"));
    }

    #[tokio::test]
    async fn test_competencies_and_coverage_use_evidence_text() {
        let fx = Fixture::new(MockLlmClient::new());
        extract_competencies(&fx.ctx(), &record()).await.unwrap();
        detect_coverage(&fx.ctx(), &record()).await.unwrap();
        for request in fx.client.requests() {
            assert_eq!(request.user_content, "Built a REST API in Go.");
            assert_eq!(request.model, "small");
        }
    }

    #[tokio::test]
    async fn test_summary_lists_competencies_in_instructions() {
        let fx = Fixture::new(MockLlmClient::new());
        let competencies = vec![Competency {
            id: "A1.1".to_string(),
            description: "Designs interfaces".to_string(),
        }];
        let summary = summarize_evidence(&fx.ctx(), &record(), &competencies)
            .await
            .unwrap();
        assert_eq!(summary.competencies[0].competency_id, "C1");
        let request = &fx.client.requests()[0];
        assert!(request.instructions.contains("- A1.1: Designs interfaces"));
        assert_eq!(request.schema.as_ref().unwrap().name(), SchemaName::EvidenceResult);
    }

    #[tokio::test]
    async fn test_synthesis_uses_writer_and_review_text() {
        let fx = Fixture::new(MockLlmClient::new());
        let style = StyleProfile {
            language: "English".to_string(),
            perspective: "first person singular".to_string(),
            tense: "past".to_string(),
            tone: "formal".to_string(),
            sentence_length: "short".to_string(),
            uses_references: true,
        };
        let coverage = vec![CoverageEntry {
            id: "C1".to_string(),
            status: crate::pipeline::types::CoverageStatus::Partial,
            reason: "mentioned".to_string(),
        }];
        let draft = synthesize_evidence(
            &fx.ctx(),
            &record(),
            "Q3 review",
            "Great API work",
            SynthesisInputs {
                style: &style,
                sections: vec![SynthesisSection::Coverage(&coverage)],
            },
        )
        .await
        .unwrap();
        assert_eq!(draft.evidence, "[dry-run] Great API work");

        let request = &fx.client.requests()[0];
        assert_eq!(request.model, "large");
        assert_eq!(request.user_content, "Great API work");
        assert!(request.instructions.contains("titled \"Q3 review\""));
        assert!(request.instructions.contains("- C1 [partial]: mentioned"));
        assert!(request.instructions.contains("References: yes"));
        assert!(!request.instructions.contains("EXISTING EVIDENCE PER COMPETENCY"));
    }

    #[tokio::test]
    async fn test_describe_skill_sends_no_schema() {
        let fx = Fixture::new(MockLlmClient::new());
        let text = describe_skill(&fx.ctx(), &record()).await.unwrap();
        assert!(text.contains("## GAPS"));
        let request = &fx.client.requests()[0];
        assert!(request.schema.is_none());
        assert!(request.user_content.contains("Note: Built a REST API"));
    }
}
