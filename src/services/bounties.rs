use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};

use super::{notifications::NotificationRequest, RequestHandler, Service, ServiceError};
use crate::models::{
    bounties::{Bounty, BountyStatus, FundBounty},
    notifications::BOUNTY_RELEASED,
};
use crate::repositories::{
    payments::{PaymentError, PaymentGateway},
    BountyRepository, ProblemRepository, UserRepository,
};

pub enum BountyRequest {
    Fund {
        funder_id: i64,
        bounty: FundBounty,
        response: oneshot::Sender<Result<Bounty, ServiceError>>,
    },
    Release {
        bounty_id: i64,
        requester_id: i64,
        solver_id: i64,
        response: oneshot::Sender<Result<Bounty, ServiceError>>,
    },
    Refund {
        bounty_id: i64,
        requester_id: i64,
        response: oneshot::Sender<Result<Bounty, ServiceError>>,
    },
    GetBounty {
        id: i64,
        response: oneshot::Sender<Result<Bounty, ServiceError>>,
    },
}

fn release_key(bounty_id: i64, solver_id: i64) -> String {
    format!("bounty-{}-release-{}", bounty_id, solver_id)
}

fn refund_key(bounty_id: i64) -> String {
    format!("bounty-{}-refund", bounty_id)
}

#[derive(Clone)]
pub struct BountyRequestHandler {
    repository: Arc<dyn BountyRepository>,
    problems: Arc<dyn ProblemRepository>,
    users: Arc<dyn UserRepository>,
    payments: Arc<dyn PaymentGateway>,
    notification_channel: mpsc::Sender<NotificationRequest>,
    currency: String,
}

impl BountyRequestHandler {
    pub fn new(
        repository: Arc<dyn BountyRepository>,
        problems: Arc<dyn ProblemRepository>,
        users: Arc<dyn UserRepository>,
        payments: Arc<dyn PaymentGateway>,
        notification_channel: mpsc::Sender<NotificationRequest>,
        currency: String,
    ) -> Self {
        BountyRequestHandler {
            repository,
            problems,
            users,
            payments,
            notification_channel,
            currency,
        }
    }

    /// Charges the funder and records a pending bounty. Nothing is written
    /// when the charge fails.
    pub async fn fund(&self, funder_id: i64, bounty: FundBounty) -> Result<Bounty, ServiceError> {
        let mut errors = Vec::new();
        if bounty.amount <= 0 {
            errors.push("Amount must be greater than zero".to_string());
        }
        if bounty.payment_method_id.trim().is_empty() {
            errors.push("Payment method is required".to_string());
        }
        if !errors.is_empty() {
            return Err(ServiceError::InvalidInput(errors));
        }

        let problem = self
            .problems
            .get_problem(bounty.problem_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Problem not found".to_string()))?;

        let intent = self
            .payments
            .create_payment_intent(
                bounty.amount,
                &self.currency,
                bounty.payment_method_id.trim(),
            )
            .await
            .inspect_err(|e| {
                log::warn!(
                    "Payment for problem {} by user {} failed: {}",
                    problem.id,
                    funder_id,
                    e
                )
            })?;

        let created = self
            .repository
            .insert_bounty(problem.id, funder_id, bounty.amount, &intent)
            .await?;

        log::info!(
            "User {} funded bounty {} on problem {} with {} ({})",
            funder_id,
            created.id,
            problem.id,
            created.amount,
            intent
        );
        Ok(created)
    }

    /// Pays a pending bounty out to the solver's payout account.
    ///
    /// The row is claimed as `releasing` before the transfer is sent, so a
    /// concurrent refund cannot move money for the same bounty. A release
    /// interrupted after its claim is finished by retrying it for the same
    /// solver.
    pub async fn release(
        &self,
        bounty_id: i64,
        requester_id: i64,
        solver_id: i64,
    ) -> Result<Bounty, ServiceError> {
        let bounty = self
            .repository
            .get_bounty(bounty_id)
            .await?
            .filter(|b| !b.status.is_terminal())
            .ok_or_else(|| {
                ServiceError::NotFound("Bounty not found or already processed".to_string())
            })?;

        if bounty.user_id != requester_id {
            log::warn!(
                "User {} tried to release bounty {} funded by user {}",
                requester_id,
                bounty.id,
                bounty.user_id
            );
            return Err(ServiceError::Forbidden(
                "Only the funder can release a bounty".to_string(),
            ));
        }

        let solver = self
            .users
            .get_user_by_id(solver_id)
            .await?
            .ok_or_else(|| ServiceError::InvalidState("Solver not found".to_string()))?;
        let destination = solver.stripe_account_id.ok_or_else(|| {
            ServiceError::InvalidState("Solver has no linked payout account".to_string())
        })?;

        let claimed = self
            .claim(bounty.id, requester_id, BountyStatus::Releasing, Some(solver.id))
            .await?;

        let transfer = match self
            .payments
            .create_transfer(
                claimed.amount,
                &self.currency,
                &destination,
                &release_key(claimed.id, solver.id),
            )
            .await
        {
            Ok(transfer) => transfer,
            Err(e) => {
                log::error!("Transfer for bounty {} failed: {}", claimed.id, e);
                self.abandon_if_rejected(claimed.id, BountyStatus::Releasing, &e)
                    .await;
                return Err(e.into());
            }
        };

        let released = self
            .settle(claimed.id, BountyStatus::Releasing, &transfer)
            .await?;

        log::info!(
            "Bounty {} released to user {} ({})",
            released.id,
            solver.id,
            transfer
        );
        self.notify_release(solver.id, &released);

        Ok(released)
    }

    /// Returns a pending bounty's charge to the funder, claiming the row as
    /// `refunding` first.
    pub async fn refund(&self, bounty_id: i64, requester_id: i64) -> Result<Bounty, ServiceError> {
        let bounty = self
            .repository
            .get_bounty(bounty_id)
            .await?
            .filter(|b| b.user_id == requester_id && !b.status.is_terminal())
            .ok_or_else(|| {
                ServiceError::NotFound("Bounty not found or already processed".to_string())
            })?;

        let payment_intent = bounty.payment_intent_id.as_deref().ok_or_else(|| {
            ServiceError::InvalidState("Bounty has no payment to refund".to_string())
        })?;

        let claimed = self
            .claim(bounty.id, requester_id, BountyStatus::Refunding, None)
            .await?;

        let refund = match self
            .payments
            .create_refund(payment_intent, &refund_key(claimed.id))
            .await
        {
            Ok(refund) => refund,
            Err(e) => {
                log::error!("Refund for bounty {} failed: {}", claimed.id, e);
                self.abandon_if_rejected(claimed.id, BountyStatus::Refunding, &e)
                    .await;
                return Err(e.into());
            }
        };

        let refunded = self
            .settle(claimed.id, BountyStatus::Refunding, &refund)
            .await?;

        log::info!("Bounty {} refunded ({})", refunded.id, refund);
        Ok(refunded)
    }

    pub async fn get_bounty(&self, id: i64) -> Result<Bounty, ServiceError> {
        self.repository
            .get_bounty(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Bounty not found".to_string()))
    }

    async fn claim(
        &self,
        bounty_id: i64,
        funder_id: i64,
        claim: BountyStatus,
        solver_id: Option<i64>,
    ) -> Result<Bounty, ServiceError> {
        self.repository
            .claim_bounty(bounty_id, funder_id, claim, solver_id)
            .await?
            .ok_or_else(|| {
                log::warn!(
                    "Bounty {} could not be claimed as {}: another settlement holds it",
                    bounty_id,
                    claim
                );
                ServiceError::InvalidState("Bounty is already being processed".to_string())
            })
    }

    async fn settle(
        &self,
        bounty_id: i64,
        claim: BountyStatus,
        settlement_id: &str,
    ) -> Result<Bounty, ServiceError> {
        self.repository
            .settle_bounty(bounty_id, claim, settlement_id)
            .await?
            .ok_or_else(|| {
                log::warn!(
                    "Bounty {} was no longer {} when {} confirmed",
                    bounty_id,
                    claim,
                    settlement_id
                );
                ServiceError::InvalidState("Bounty has already been processed".to_string())
            })
    }

    /// A refused movement frees the claim. Transport failures keep it: the
    /// processor may have acted, and only a retry with the same key can tell.
    async fn abandon_if_rejected(
        &self,
        bounty_id: i64,
        claim: BountyStatus,
        error: &PaymentError,
    ) {
        if !matches!(error, PaymentError::Rejected(_)) {
            log::warn!(
                "Bounty {} stays {} until the request is retried",
                bounty_id,
                claim
            );
            return;
        }

        if let Err(e) = self.repository.abandon_claim(bounty_id, claim).await {
            log::error!("Could not return bounty {} to pending: {}", bounty_id, e);
        }
    }

    fn notify_release(&self, solver_id: i64, bounty: &Bounty) {
        let notification_channel = self.notification_channel.clone();
        let request = NotificationRequest::Notify {
            user_id: solver_id,
            kind: BOUNTY_RELEASED.to_string(),
            message: format!("A bounty of {} was released to you", bounty.amount),
            context: json!({
                "bounty_id": bounty.id,
                "problem_id": bounty.problem_id,
                "amount": bounty.amount,
            }),
        };

        tokio::spawn(async move {
            let _ = notification_channel.send(request).await;
        });
    }
}

#[async_trait]
impl RequestHandler<BountyRequest> for BountyRequestHandler {
    async fn handle_request(&self, request: BountyRequest) {
        match request {
            BountyRequest::Fund {
                funder_id,
                bounty,
                response,
            } => {
                let result = self.fund(funder_id, bounty).await;
                let _ = response.send(result);
            }
            BountyRequest::Release {
                bounty_id,
                requester_id,
                solver_id,
                response,
            } => {
                let result = self.release(bounty_id, requester_id, solver_id).await;
                let _ = response.send(result);
            }
            BountyRequest::Refund {
                bounty_id,
                requester_id,
                response,
            } => {
                let result = self.refund(bounty_id, requester_id).await;
                let _ = response.send(result);
            }
            BountyRequest::GetBounty { id, response } => {
                let result = self.get_bounty(id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct BountyService;

impl BountyService {
    pub fn new() -> Self {
        BountyService {}
    }
}

#[async_trait]
impl Service<BountyRequest, BountyRequestHandler> for BountyService {}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::repositories::{
        memory::MemoryStore,
        payments::recording::{PaymentCall, RecordingGateway},
    };

    struct Fixture {
        handler: BountyRequestHandler,
        gateway: RecordingGateway,
        store: MemoryStore,
        notifications: mpsc::Receiver<NotificationRequest>,
        funder: i64,
        solver: i64,
        problem: i64,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let repositories = store.repositories();
        let gateway = RecordingGateway::new();
        let funder = store.insert_user("f@nexro.app", "hash", "Funder").await.unwrap();
        let solver = store.insert_user("s@nexro.app", "hash", "Solver").await.unwrap();
        store.set_payout_account(solver.id, "acct_solver").await.unwrap();
        let problem = repositories
            .problems
            .insert_problem(funder.id, "Bridge", "Repaint it", None, 0)
            .await
            .unwrap();
        let (tx, rx) = mpsc::channel(16);

        Fixture {
            handler: BountyRequestHandler::new(
                repositories.bounties,
                repositories.problems,
                repositories.users,
                Arc::new(gateway.clone()),
                tx,
                "usd".to_string(),
            ),
            gateway,
            store,
            notifications: rx,
            funder: funder.id,
            solver: solver.id,
            problem: problem.id,
        }
    }

    fn funding(problem_id: i64, amount: i64) -> FundBounty {
        FundBounty {
            problem_id,
            amount,
            payment_method_id: "pm_card_visa".to_string(),
        }
    }

    #[tokio::test]
    async fn funding_records_a_pending_bounty() {
        let f = fixture().await;

        let bounty = f.handler.fund(f.funder, funding(f.problem, 500)).await.unwrap();

        assert_eq!(bounty.status, BountyStatus::Pending);
        assert_eq!(bounty.payment_intent_id.as_deref(), Some("pi_1"));
        assert_eq!(
            f.gateway.calls().await,
            vec![PaymentCall::PaymentIntent {
                amount: 500,
                currency: "usd".to_string(),
                payment_method: "pm_card_visa".to_string(),
            }]
        );
        assert_eq!(f.handler.get_bounty(bounty.id).await.unwrap(), bounty);
    }

    #[tokio::test]
    async fn declined_payment_writes_nothing() {
        let f = fixture().await;
        f.gateway.decline_all();

        let result = f.handler.fund(f.funder, funding(f.problem, 500)).await;

        match result {
            Err(ServiceError::PaymentFailed(message)) => {
                assert_eq!(message, "Your card was declined.")
            }
            other => panic!("expected payment failure, got {:?}", other),
        }
        for id in 1..=4 {
            assert!(f.store.get_bounty(id).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn funding_validates_before_charging() {
        let f = fixture().await;

        let invalid = f
            .handler
            .fund(
                f.funder,
                FundBounty {
                    problem_id: f.problem,
                    amount: 0,
                    payment_method_id: " ".to_string(),
                },
            )
            .await;
        let missing = f.handler.fund(f.funder, funding(f.problem + 100, 10)).await;

        match invalid {
            Err(ServiceError::InvalidInput(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected invalid input, got {:?}", other),
        }
        assert!(matches!(missing, Err(ServiceError::NotFound(_))));
        assert!(f.gateway.calls().await.is_empty());
    }

    #[tokio::test]
    async fn release_transfers_once_and_notifies_the_solver() {
        let mut f = fixture().await;
        let bounty = f.handler.fund(f.funder, funding(f.problem, 500)).await.unwrap();

        let released = f
            .handler
            .release(bounty.id, f.funder, f.solver)
            .await
            .unwrap();

        assert_eq!(released.status, BountyStatus::Released);
        assert_eq!(released.settlement_id.as_deref(), Some("tr_2"));
        assert_eq!(
            f.gateway.calls().await[1],
            PaymentCall::Transfer {
                amount: 500,
                destination: "acct_solver".to_string(),
                idempotency_key: format!("bounty-{}-release-{}", bounty.id, f.solver),
            }
        );
        match f.notifications.recv().await {
            Some(NotificationRequest::Notify { user_id, kind, .. }) => {
                assert_eq!(user_id, f.solver);
                assert_eq!(kind, BOUNTY_RELEASED);
            }
            _ => panic!("expected a bountyReleased notification"),
        }
    }

    #[tokio::test]
    async fn settled_bounties_cannot_transition_again() {
        let f = fixture().await;
        let released = f.handler.fund(f.funder, funding(f.problem, 100)).await.unwrap();
        let refunded = f.handler.fund(f.funder, funding(f.problem, 200)).await.unwrap();
        f.handler
            .release(released.id, f.funder, f.solver)
            .await
            .unwrap();
        f.handler.refund(refunded.id, f.funder).await.unwrap();
        let calls_before = f.gateway.calls().await.len();

        for result in [
            f.handler.release(released.id, f.funder, f.solver).await,
            f.handler.refund(released.id, f.funder).await,
            f.handler.release(refunded.id, f.funder, f.solver).await,
            f.handler.refund(refunded.id, f.funder).await,
        ] {
            assert!(matches!(result, Err(ServiceError::NotFound(_))));
        }
        assert_eq!(f.gateway.calls().await.len(), calls_before);
        assert_eq!(
            f.handler.get_bounty(refunded.id).await.unwrap().status,
            BountyStatus::Refunded
        );
    }

    #[tokio::test]
    async fn only_the_funder_can_release() {
        let f = fixture().await;
        let bounty = f.handler.fund(f.funder, funding(f.problem, 100)).await.unwrap();

        let result = f.handler.release(bounty.id, f.solver, f.solver).await;

        assert!(matches!(result, Err(ServiceError::Forbidden(_))));
        assert_eq!(
            f.handler.get_bounty(bounty.id).await.unwrap().status,
            BountyStatus::Pending
        );
    }

    #[tokio::test]
    async fn release_needs_a_linked_payout_account() {
        let f = fixture().await;
        let unlinked = f
            .store
            .insert_user("u@nexro.app", "hash", "Unlinked")
            .await
            .unwrap();
        let bounty = f.handler.fund(f.funder, funding(f.problem, 100)).await.unwrap();

        let no_account = f.handler.release(bounty.id, f.funder, unlinked.id).await;
        let no_solver = f.handler.release(bounty.id, f.funder, 9999).await;

        assert!(matches!(no_account, Err(ServiceError::InvalidState(_))));
        assert!(matches!(no_solver, Err(ServiceError::InvalidState(_))));
    }

    #[tokio::test]
    async fn refund_uses_the_stored_intent() {
        let f = fixture().await;
        let bounty = f.handler.fund(f.funder, funding(f.problem, 300)).await.unwrap();

        let stranger = f.handler.refund(bounty.id, f.solver).await;
        let refunded = f.handler.refund(bounty.id, f.funder).await.unwrap();

        assert!(matches!(stranger, Err(ServiceError::NotFound(_))));
        assert_eq!(refunded.status, BountyStatus::Refunded);
        assert_eq!(
            f.gateway.calls().await[1],
            PaymentCall::Refund {
                payment_intent: "pi_1".to_string(),
                idempotency_key: format!("bounty-{}-refund", bounty.id),
            }
        );
    }

    #[tokio::test]
    async fn concurrent_release_and_refund_move_money_once() {
        let f = fixture().await;
        let bounty = f.handler.fund(f.funder, funding(f.problem, 400)).await.unwrap();
        f.gateway.delay_settlements(Duration::from_millis(50));

        let (released, refunded) = tokio::join!(
            f.handler.release(bounty.id, f.funder, f.solver),
            f.handler.refund(bounty.id, f.funder)
        );

        assert_eq!(f.gateway.money_movements().await, 1);
        let stored = f.handler.get_bounty(bounty.id).await.unwrap();
        match (released, refunded) {
            (Ok(winner), Err(ServiceError::InvalidState(_))) => {
                assert_eq!(winner.status, BountyStatus::Released);
                assert_eq!(stored, winner);
            }
            (Err(ServiceError::InvalidState(_)), Ok(winner)) => {
                assert_eq!(winner.status, BountyStatus::Refunded);
                assert_eq!(stored, winner);
            }
            other => panic!("expected exactly one settlement, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn claimed_release_completes_on_retry() {
        let f = fixture().await;
        let bounty = f.handler.fund(f.funder, funding(f.problem, 250)).await.unwrap();
        // A release that crashed after claiming the row.
        f.store
            .claim_bounty(bounty.id, f.funder, BountyStatus::Releasing, Some(f.solver))
            .await
            .unwrap()
            .unwrap();

        let refund = f.handler.refund(bounty.id, f.funder).await;
        let retried = f
            .handler
            .release(bounty.id, f.funder, f.solver)
            .await
            .unwrap();

        assert!(matches!(refund, Err(ServiceError::InvalidState(_))));
        assert_eq!(retried.status, BountyStatus::Released);
        assert_eq!(retried.solver_id, Some(f.solver));
        assert_eq!(f.gateway.money_movements().await, 1);
    }

    #[tokio::test]
    async fn rejected_transfer_frees_the_bounty_for_another_solver() {
        let f = fixture().await;
        let other = f
            .store
            .insert_user("o@nexro.app", "hash", "Other")
            .await
            .unwrap();
        f.store.set_payout_account(other.id, "acct_other").await.unwrap();
        let bounty = f.handler.fund(f.funder, funding(f.problem, 250)).await.unwrap();

        f.gateway.decline_all();
        let declined = f.handler.release(bounty.id, f.funder, f.solver).await;
        let after_decline = f.handler.get_bounty(bounty.id).await.unwrap();
        f.gateway.accept_all();
        let released = f
            .handler
            .release(bounty.id, f.funder, other.id)
            .await
            .unwrap();

        assert!(matches!(declined, Err(ServiceError::PaymentFailed(_))));
        assert_eq!(after_decline.status, BountyStatus::Pending);
        assert_eq!(after_decline.solver_id, None);
        assert_eq!(released.solver_id, Some(other.id));
        assert_eq!(
            f.gateway.calls().await[1],
            PaymentCall::Transfer {
                amount: 250,
                destination: "acct_other".to_string(),
                idempotency_key: format!("bounty-{}-release-{}", bounty.id, other.id),
            }
        );
    }
}
