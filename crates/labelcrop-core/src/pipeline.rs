//! Pipeline orchestration
//!
//! One run takes the uploaded documents through, in order:
//! 1. Split by order id, when ids were supplied (pools all inputs)
//! 2. Otherwise merge into one document, or keep one document per input
//! 3. Per output document: crop, reorder by courier, append the summary report
//!
//! Optional stages degrade instead of failing. Only unreadable input or an
//! empty upload fails the run.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::classify::classify_pages;
use crate::config::{FilterOptions, PipelineConfig};
use crate::crop::PageCropper;
use crate::document::LabelDocument;
use crate::error::LabelCropError;
use crate::raster::PageRasterizer;
use crate::record::{extract_records, FixedOffsetLayout};
use crate::reorder::apply_order;
use crate::report::render_report;
use crate::split::{split_documents, OrderSplitRequest};
use crate::stage::{Stage, StageOutcome, StageReport};
use crate::summary::SummaryTables;

/// An uploaded file.
#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl PipelineInput {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

#[derive(Debug)]
pub struct ProcessedDocument {
    pub document: LabelDocument,
    pub stages: Vec<StageReport>,
}

impl ProcessedDocument {
    pub fn degraded(&self) -> impl Iterator<Item = &StageReport> {
        self.stages.iter().filter(|s| !s.outcome.is_applied())
    }

    fn into_output(self, name: String) -> Result<OutputFile, LabelCropError> {
        let bytes = self.document.to_bytes()?;
        tracing::info!(
            file = %name,
            pages = self.document.page_count(),
            bytes = bytes.len(),
            "Output ready"
        );
        Ok(OutputFile {
            name,
            bytes,
            page_count: self.document.page_count(),
            stages: self.stages,
        })
    }
}

#[derive(Debug, Clone)]
pub struct OutputFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Clone)]
pub enum PipelineOutput {
    /// One merged document
    Single(OutputFile),
    /// Several named documents, to be packaged together
    Archive(Vec<OutputFile>),
}

impl PipelineOutput {
    pub fn files(&self) -> &[OutputFile] {
        match self {
            PipelineOutput::Single(file) => std::slice::from_ref(file),
            PipelineOutput::Archive(files) => files,
        }
    }
}

#[derive(Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
    rasterizer: Option<Arc<dyn PageRasterizer>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("rasterizer", &self.rasterizer_name())
            .finish()
    }
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            rasterizer: None,
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn rasterizer_name(&self) -> Option<&'static str> {
        self.rasterizer.as_ref().map(|r| r.name())
    }

    /// Run the whole pipeline over a batch of uploads.
    pub fn run(
        &self,
        inputs: Vec<PipelineInput>,
        options: &FilterOptions,
        order_list: &str,
    ) -> Result<PipelineOutput, LabelCropError> {
        if inputs.is_empty() {
            return Err(LabelCropError::NoInput);
        }
        tracing::info!(inputs = inputs.len(), options = ?options, "Starting pipeline run");

        let names: Vec<String> = inputs.iter().map(|i| i.name.clone()).collect();
        let documents = inputs
            .into_iter()
            .map(|input| load_named(&input))
            .collect::<Result<Vec<_>, _>>()?;
        let stem = file_stem(&names[0]);

        let request = OrderSplitRequest::parse(order_list);
        if !request.is_empty() {
            tracing::info!(ids = ?request.ids(), "Splitting by order id");
            let split = split_documents(&documents, &request)?;
            let mut files = Vec::new();
            for (name, side) in [
                (format!("{}_selected.pdf", stem), split.selected),
                ("cleaned.pdf".to_string(), split.cleaned),
            ] {
                if side.is_empty() {
                    tracing::info!(file = %name, "Split side has no pages, omitted");
                    continue;
                }
                files.push(self.process_document(side, options)?.into_output(name)?);
            }
            return Ok(PipelineOutput::Archive(files));
        }

        if options.merge_all {
            let merged = LabelDocument::merge(&documents)?;
            let processed = self.process_document(merged, options)?;
            return Ok(PipelineOutput::Single(
                processed.into_output(format!("{}_merged.pdf", stem))?,
            ));
        }

        let mut used = HashSet::new();
        let mut files = Vec::new();
        for (name, document) in names.iter().zip(documents) {
            let processed = self.process_document(document, options)?;
            files.push(processed.into_output(unique_name(name, &mut used))?);
        }
        Ok(PipelineOutput::Archive(files))
    }

    /// Apply the per-document stages selected in `options`.
    pub fn process_document(
        &self,
        original: LabelDocument,
        options: &FilterOptions,
    ) -> Result<ProcessedDocument, LabelCropError> {
        let mut stages = Vec::new();

        // Records and courier metadata come from the source pages; cropped
        // pages are images with no text left to read.
        let report = options.append_summary.then(|| self.summary_report(&original));
        let classified = options
            .sort_by_courier
            .then(|| classify_pages(&original, &self.config.classifier));

        let mut working = if options.remove_whitespace {
            let cropper = PageCropper::new(&self.config.crop, self.rasterizer.as_deref())
                .keep_invoice_uncropped(options.keep_invoice_uncropped);
            let (cropped, outcome) = cropper.crop(&original)?;
            stages.push(StageReport::new(Stage::Crop, outcome));
            cropped
        } else {
            original
        };

        if let Some(classified) = classified {
            let (sorted, outcome) = match classified {
                Ok(meta) => apply_order(working, &meta),
                Err(e) => (working, StageOutcome::degraded(format!("classification failed: {}", e))),
            };
            stages.push(StageReport::new(Stage::Reorder, outcome));
            working = sorted;
        }

        if let Some(report) = report {
            let (appended, outcome) = match report {
                Ok(report) => {
                    let parts = [working, report];
                    let merged = LabelDocument::merge(&parts);
                    match merged {
                        Ok(doc) => (doc, StageOutcome::Applied),
                        Err(e) => {
                            let [working, _] = parts;
                            (working, StageOutcome::degraded(format!("cannot append report: {}", e)))
                        }
                    }
                }
                Err(reason) => (working, StageOutcome::Degraded { reason }),
            };
            stages.push(StageReport::new(Stage::Summary, outcome));
            working = appended;
        }

        Ok(ProcessedDocument {
            document: working,
            stages,
        })
    }

    /// Report pages for `doc`, or why there are none.
    fn summary_report(&self, doc: &LabelDocument) -> Result<LabelDocument, String> {
        let layout = FixedOffsetLayout::from_config(&self.config.classifier);
        let records =
            extract_records(doc, &layout, self.config.record_policy).map_err(|e| e.to_string())?;
        if records.is_empty() {
            return Err("no shipment records found".to_string());
        }
        render_report(&SummaryTables::build(&records)).map_err(|e| e.to_string())
    }
}

fn load_named(input: &PipelineInput) -> Result<LabelDocument, LabelCropError> {
    let doc = LabelDocument::load(&input.bytes).map_err(|e| match e {
        LabelCropError::ParseError(msg) => LabelCropError::ParseError(format!("{}: {}", input.name, msg)),
        other => other,
    })?;
    tracing::debug!(file = %input.name, pages = doc.page_count(), "Upload parsed");
    Ok(doc)
}

fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string())
}

/// `name`, or `name` with a `_n` suffix before the extension when already taken.
fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    let base = if name.trim().is_empty() { "output.pdf" } else { name };
    if used.insert(base.to_string()) {
        return base.to_string();
    }
    let path = Path::new(base);
    let stem = file_stem(base);
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let mut n = 2;
    loop {
        let candidate = format!("{}_{}{}", stem, n, ext);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
