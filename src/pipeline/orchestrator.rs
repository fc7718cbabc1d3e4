use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::stages::{self, StageContext, SynthesisInputs, SynthesisSection};
use super::types::{EvidenceDraft, SkillMatch};
use crate::config::{Config, PipelineConfig, SynthesisInput};
use crate::error::PipelineError;
use crate::llm::{LlmClient, ModelGateway, ModelRole};
use crate::prompts::PromptLibrary;
use crate::skills::SkillRecord;

/// The two end-to-end operations, plus the preflight description.
///
/// A `Pipeline` owns one cancellation token shared by both gateways; cancelling
/// it fails every in-flight model call with a transport error.
pub struct Pipeline {
    classifier: ModelGateway,
    writer: ModelGateway,
    prompts: Arc<PromptLibrary>,
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(
        classifier: ModelGateway,
        writer: ModelGateway,
        prompts: Arc<PromptLibrary>,
        config: PipelineConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        Self {
            classifier: classifier.with_cancellation(cancel.clone()),
            writer: writer.with_cancellation(cancel.clone()),
            prompts,
            config,
            cancel,
        }
    }

    pub fn from_config(
        client: Arc<dyn LlmClient>,
        config: &Config,
        prompts: Arc<PromptLibrary>,
    ) -> Self {
        Self::new(
            ModelGateway::from_config(client.clone(), config, ModelRole::Classifier),
            ModelGateway::from_config(client, config, ModelRole::Writer),
            prompts,
            config.pipeline.clone(),
        )
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn context(&self) -> StageContext<'_> {
        StageContext {
            classifier: &self.classifier,
            writer: &self.writer,
            prompts: &self.prompts,
        }
    }

    /// Classify every record against `query` and keep `fit`/`weak_fit`.
    ///
    /// Up to `max_concurrency` calls run at once, but results are reported in
    /// record order. The first failure aborts the scan and drops the calls
    /// still in flight.
    pub async fn find_fitting_skills(
        &self,
        records: &[SkillRecord],
        query: &str,
    ) -> Result<Vec<SkillMatch>, PipelineError> {
        let ctx = self.context();
        let ctx = &ctx;
        let limit = self.config.max_concurrency.max(1);
        let start = Instant::now();
        info!(records = records.len(), concurrency = limit, "Scanning skills");

        let verdicts: Vec<_> = stream::iter(records.iter().enumerate())
            .map(|(index, record)| async move {
                let verdict = stages::classify_fitness(ctx, record, query).await?;
                debug!(
                    index,
                    competence = %record.competence,
                    fitness = %verdict.fitness,
                    "{}",
                    verdict.reason
                );
                Ok::<_, PipelineError>((index, verdict))
            })
            .buffered(limit)
            .try_collect()
            .await?;

        let matches: Vec<SkillMatch> = verdicts
            .into_iter()
            .filter(|(_, verdict)| verdict.fitness.is_match())
            .map(|(skill_index, verdict)| SkillMatch {
                skill_index,
                fitness: verdict.fitness,
            })
            .collect();

        info!(
            matches = matches.len(),
            duration_s = start.elapsed().as_secs_f64(),
            "Skill scan finished"
        );
        Ok(matches)
    }

    /// Produce one evidence draft for `record` from `review`.
    ///
    /// Stages run in dependency order: style, competencies and coverage are
    /// siblings (concurrent when `parallel_stages` is set), the evidence
    /// summary needs the competencies, and synthesis needs everything. Which
    /// of the optional stages run, and the order of their sections in the
    /// synthesis prompt, follows `synthesis_inputs`.
    pub async fn generate_evidence(
        &self,
        record: &SkillRecord,
        title: &str,
        review: &str,
    ) -> Result<EvidenceDraft, PipelineError> {
        let ctx = self.context();
        let wants = |input: SynthesisInput| self.config.synthesis_inputs.contains(&input);
        let need_competencies =
            wants(SynthesisInput::Competencies) || wants(SynthesisInput::EvidenceSummary);
        let need_coverage = wants(SynthesisInput::Coverage);
        let start = Instant::now();
        info!(
            competence = %record.competence,
            inputs = ?self.config.synthesis_inputs,
            "Generating evidence"
        );

        let style = stages::analyze_style(&ctx, std::slice::from_ref(record));
        let competencies = async {
            if need_competencies {
                stages::extract_competencies(&ctx, record).await.map(Some)
            } else {
                Ok(None)
            }
        };
        let coverage = async {
            if need_coverage {
                stages::detect_coverage(&ctx, record).await.map(Some)
            } else {
                Ok(None)
            }
        };

        let (style, competencies, coverage) = if self.config.parallel_stages {
            tokio::try_join!(style, competencies, coverage)?
        } else {
            (style.await?, competencies.await?, coverage.await?)
        };

        let summary = match &competencies {
            Some(list) if wants(SynthesisInput::EvidenceSummary) => {
                Some(stages::summarize_evidence(&ctx, record, &list.competencies).await?)
            }
            _ => None,
        };

        let sections = self
            .config
            .synthesis_inputs
            .iter()
            .filter_map(|input| match input {
                SynthesisInput::Competencies => competencies
                    .as_ref()
                    .map(|list| SynthesisSection::Competencies(&list.competencies)),
                SynthesisInput::Coverage => coverage
                    .as_ref()
                    .map(|c| SynthesisSection::Coverage(&c.coverage)),
                SynthesisInput::EvidenceSummary => summary
                    .as_ref()
                    .map(|s| SynthesisSection::Summaries(&s.competencies)),
            })
            .collect();
        let inputs = SynthesisInputs {
            style: &style,
            sections,
        };
        let draft = stages::synthesize_evidence(&ctx, record, title, review, inputs).await?;

        info!(
            competence = %record.competence,
            duration_s = start.elapsed().as_secs_f64(),
            "Evidence generated"
        );
        Ok(draft)
    }

    pub async fn describe_skill(&self, record: &SkillRecord) -> Result<String, PipelineError> {
        stages::describe_skill(&self.context(), record).await
    }
}
