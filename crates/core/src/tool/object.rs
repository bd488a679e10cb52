use std::future::ready;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{Approval, ApprovalResult, Error, Tool, ToolOutput};
use crate::permission::{PermissionBehavior, PermissionEngine};

pub(crate) type BoxedToolFuture =
    Pin<Box<dyn Future<Output = ToolOutput> + Send>>;
pub(crate) type ApprovalHandler = Arc<dyn Fn(Approval) + Send + Sync>;

/// Decides whether a call may run.
#[derive(Clone, Copy)]
pub(crate) struct Gate<'a> {
    pub permission: Option<&'a dyn PermissionEngine>,
    pub on_request: Option<&'a ApprovalHandler>,
}

pub(crate) trait ToolObject: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn input_schema(&self) -> &Value;

    fn execute(
        self: Arc<Self>,
        input: Value,
        gate: Gate<'_>,
        cancel: CancellationToken,
    ) -> BoxedToolFuture;
}

pub(crate) struct ToolObjectImpl<T: Tool>(pub T);

impl<T: Tool> ToolObjectImpl<T> {
    /// Raises an approval and returns the receiver of its answer.
    fn request_approval(
        &self,
        input: &T::Input,
        reason: Option<&str>,
        on_request: Option<&ApprovalHandler>,
    ) -> oneshot::Receiver<ApprovalResult> {
        let (approval_res_tx, approval_res_rx) = oneshot::channel();
        let mut approval = self.0.make_approval(input);
        approval.set_tool_name(self.0.name());
        if let Some(reason) = reason {
            approval.set_justification_if_empty(reason);
        }
        approval.on_result = Some(Box::new(move |result| {
            approval_res_tx.send(result).ok();
        }));

        if let Some(on_request) = on_request {
            on_request(approval);
        } else {
            // Nobody to ask.
            approval.reject(Some("no approval handler".to_owned()));
        }
        approval_res_rx
    }
}

impl<T: Tool> ToolObject for ToolObjectImpl<T> {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    #[inline]
    fn description(&self) -> &str {
        self.0.description()
    }

    #[inline]
    fn input_schema(&self) -> &Value {
        self.0.input_schema()
    }

    fn execute(
        self: Arc<Self>,
        input: Value,
        gate: Gate<'_>,
        cancel: CancellationToken,
    ) -> BoxedToolFuture {
        let decision = gate
            .permission
            .map(|engine| engine.decide(self.0.name(), &input));

        let input = match self.0.parse(input) {
            Ok(input) => input,
            Err(err) => return Box::pin(ready(Err(err))),
        };

        let approval_res_rx = match decision {
            None => None,
            Some(decision) => match decision.behavior {
                PermissionBehavior::Allow => None,
                PermissionBehavior::Deny => {
                    let mut err = Error::permission_denied();
                    if let Some(reason) = decision.reason {
                        err = err.with_reason(reason);
                    }
                    return Box::pin(ready(Err(err)));
                }
                PermissionBehavior::Ask => Some(self.request_approval(
                    &input,
                    decision.reason.as_deref(),
                    gate.on_request,
                )),
            },
        };

        let span = debug_span!("tool execute", name = self.0.name());
        Box::pin(
            async move {
                if let Some(approval_res_rx) = approval_res_rx {
                    let Ok(approval_res) = approval_res_rx.await else {
                        return Err(Error::user_rejected());
                    };
                    trace!("tool call approval result: {approval_res:?}");
                    if !approval_res.approved {
                        let mut err = Error::user_rejected();
                        if let Some(reason) = approval_res.why {
                            err = err.with_reason(reason);
                        }
                        return Err(err);
                    }
                }
                self.0.execute(input, cancel).await
            }
            .instrument(span),
        )
    }
}
