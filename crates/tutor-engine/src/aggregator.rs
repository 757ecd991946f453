use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{error, info};

use tutor_core::analysis::{AnalyzeResponse, GrammarResult, ReadingResult, VocabularyResult};
use tutor_core::ids::SessionId;

use crate::producer::AgentOutcome;

/// Final outcome of each analysis agent for one request.
#[derive(Debug)]
pub struct AgentOutcomes {
    pub reading: AgentOutcome<ReadingResult>,
    pub grammar: AgentOutcome<GrammarResult>,
    pub vocabulary: AgentOutcome<VocabularyResult>,
}

/// Fold the outcomes into the response. Failed agents leave their field `None`.
///
/// Never panics: if assembly blows up, the result is an all-`None` response
/// for `session_id`.
pub fn aggregate(session_id: &SessionId, outcomes: AgentOutcomes) -> AnalyzeResponse {
    // Assembly is plain moves and cannot panic today; the guard holds the
    // all-`None` contract if result conversion ever grows fallible.
    let assembled = catch_unwind(AssertUnwindSafe(|| AnalyzeResponse {
        session_id: session_id.clone(),
        reading: outcomes.reading.ok(),
        grammar: outcomes.grammar.ok(),
        vocabulary: outcomes.vocabulary.ok(),
    }));
    match assembled {
        Ok(response) => {
            info!(
                session_id = %session_id,
                completed = response.completed_sections(),
                "analysis aggregated"
            );
            response
        }
        Err(_) => {
            error!(session_id = %session_id, "aggregation panicked, returning empty response");
            AnalyzeResponse::empty(session_id.clone())
        }
    }
}
