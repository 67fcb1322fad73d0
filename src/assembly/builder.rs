//! Output materialization

use crate::assembly::engine::DocumentHandle;
use crate::assembly::plan::{AssemblyPlan, PageReference};
use crate::error::{Error, Result};
use crate::pdf::PageCodec;
use tracing::{debug, instrument};

/// Walks a plan in order and has the codec materialize each page.
///
/// The output page order is the plan order, always. Pages are rendered one
/// after another and nothing is returned unless every page and the final
/// write succeed.
pub struct OutputBuilder<'c, C> {
    codec: &'c C,
}

impl<'c, C: PageCodec> OutputBuilder<'c, C> {
    pub fn new(codec: &'c C) -> Self {
        Self { codec }
    }

    #[instrument(skip_all, fields(pages = plan.len()))]
    pub fn build(
        &self,
        plan: &AssemblyPlan,
        documents: &[DocumentHandle<C::Document>],
    ) -> Result<Vec<u8>> {
        let mut pages = Vec::with_capacity(plan.len());

        for (position, reference) in plan.pages().iter().enumerate() {
            let handle = documents
                .get(reference.source.0)
                .ok_or_else(|| Error::Materialization {
                    reason: format!(
                        "output page {} refers to unknown document {}",
                        position + 1,
                        reference.source.0
                    ),
                })?;

            let page = self
                .codec
                .render_page(handle.document(), reference.page, &reference.transform)
                .map_err(|e| materialization_error(e, position, reference))?;
            pages.push(page);
        }

        debug!(pages = pages.len(), "All pages rendered, writing document");

        self.codec
            .write_document(pages)
            .map_err(|e| Error::Materialization {
                reason: format!("failed to write output: {}", e),
            })
    }
}

fn materialization_error(err: Error, position: usize, reference: &PageReference) -> Error {
    Error::Materialization {
        reason: format!(
            "output page {} (document {}, page {}): {}",
            position + 1,
            reference.source.0,
            reference.page,
            err
        ),
    }
}
