//! Policy checker: one evaluation request in, one result record out.

use crate::engine::PolicyEngine;
use crate::store::PolicyStore;
use aclcheck_core::{AclResult, EvaluationRequest, ResultRecord};
use tracing::debug;

pub struct PolicyChecker<E> {
    store: PolicyStore,
    engine: E,
}

impl<E: PolicyEngine> PolicyChecker<E> {
    pub fn new(store: PolicyStore, engine: E) -> Self {
        Self { store, engine }
    }

    pub fn store(&self) -> &PolicyStore {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn engine(&self) -> &E {
        &self.engine
    }

    /// Load the request's policy, evaluate it, and build the result record.
    ///
    /// The result text is the verdict, a blank line, then every header
    /// comment of the policy on its own line.
    pub async fn check(&self, request: EvaluationRequest) -> AclResult<ResultRecord> {
        let document = self.store.load_policy(&request.policy).await?;
        let evaluation = self.engine.evaluate(&document, &request).await?;

        let mut result = evaluation.verdict;
        result.push('\n');
        for comment in &evaluation.comments {
            result.push('\n');
            result.push_str(comment);
        }

        debug!(
            policy = %request.policy,
            protocol = %request.protocol,
            src = %request.src,
            dst = %request.dst,
            "checked"
        );
        Ok(ResultRecord::new(request, result))
    }
}
