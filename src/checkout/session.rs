use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::checkout::debounce::RequestSequence;
use crate::clients::PaymentIntent;
use crate::delivery::eligibility::{revalidate, EligibilityReport};
use crate::delivery::schedule::{validate_selection, WeeklySchedule};
use crate::errors::CheckoutError;
use crate::events::Event;
use crate::models::{
    AccountRole, ActiveAddress, CartLine, CheckoutSelection, CourierQuote, DeliveryMethod,
    OrderDraft, PaymentRail, PendingPayment, SellerCartGroup, SellerSelection,
};

/// Checkout progresses strictly forward except for the single backward edge
/// from payment configuration back to delivery, which invalidates any
/// reserved gateway intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CheckoutState {
    ConfiguringDelivery,
    DeliveryConfirmed,
    ConfiguringPayment,
    PaymentInFlight,
    Succeeded,
    Failed,
}

/// What the payment layer needs to do after entering payment configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSetup {
    pub total: Decimal,
    pub rail: PaymentRail,
    /// True when a gateway client secret sized to the total must be
    /// requested eagerly (non-ledger payers only).
    pub needs_gateway_intent: bool,
}

/// Result of applying an eligibility refresh to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum RevalidationStatus {
    /// The refresh was current and has been applied.
    Applied {
        fallbacks: Vec<crate::delivery::eligibility::FallbackOutcome>,
    },
    /// A newer edit superseded this refresh; nothing was changed.
    Superseded,
}

/// Pure UI-facing projection of the session state. Collapsing and expanding
/// sections is presentation, not a business rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionView {
    pub delivery_collapsed: bool,
    pub payment_visible: bool,
}

/// The checkout state machine for one buyer session.
///
/// The machine is pure and synchronous: commands mutate state and push
/// structured events onto an outbox; all network effects (quoting, geocoding,
/// gateway calls) happen in the surrounding services, which feed results back
/// in. Presentation subscribes to the drained events.
#[derive(Debug)]
pub struct CheckoutSession {
    draft_id: Uuid,
    buyer_account: Uuid,
    role: AccountRole,
    currency: String,
    state: CheckoutState,
    groups: Vec<SellerCartGroup>,
    reports: HashMap<Uuid, EligibilityReport>,
    active_address: Option<ActiveAddress>,
    selection: CheckoutSelection,
    payment_intent: Option<PaymentIntent>,
    revalidation_seq: RequestSequence,
    outbox: Vec<Event>,
}

impl CheckoutSession {
    pub fn new(
        buyer_account: Uuid,
        role: AccountRole,
        currency: impl Into<String>,
        lines: Vec<CartLine>,
    ) -> Result<Self, CheckoutError> {
        if lines.is_empty() {
            return Err(CheckoutError::InvalidOperation("Cart is empty".to_string()));
        }
        Ok(Self {
            draft_id: Uuid::new_v4(),
            buyer_account,
            role,
            currency: currency.into(),
            state: CheckoutState::ConfiguringDelivery,
            groups: SellerCartGroup::group(lines),
            reports: HashMap::new(),
            active_address: None,
            selection: CheckoutSelection::default(),
            payment_intent: None,
            revalidation_seq: RequestSequence::new(),
            outbox: Vec::new(),
        })
    }

    pub fn draft_id(&self) -> Uuid {
        self.draft_id
    }

    pub fn state(&self) -> CheckoutState {
        self.state
    }

    pub fn groups(&self) -> &[SellerCartGroup] {
        &self.groups
    }

    pub fn selection(&self) -> &CheckoutSelection {
        &self.selection
    }

    pub fn active_address(&self) -> Option<&ActiveAddress> {
        self.active_address.as_ref()
    }

    pub fn payment_intent(&self) -> Option<&PaymentIntent> {
        self.payment_intent.as_ref()
    }

    pub fn rail(&self) -> PaymentRail {
        if self.role.ledger_eligible() {
            PaymentRail::Ledger
        } else {
            PaymentRail::Gateway
        }
    }

    pub fn subtotal(&self) -> Decimal {
        self.groups.iter().map(SellerCartGroup::subtotal).sum()
    }

    pub fn delivery_total(&self) -> Decimal {
        self.selection.total_delivery_fees()
    }

    pub fn total(&self) -> Decimal {
        self.subtotal() + self.delivery_total()
    }

    /// Takes every event pushed since the last drain, in order.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.outbox)
    }

    /// Pure projection for the rendering layer.
    pub fn section_view(&self) -> SectionView {
        SectionView {
            delivery_collapsed: self.state != CheckoutState::ConfiguringDelivery,
            payment_visible: matches!(
                self.state,
                CheckoutState::ConfiguringPayment
                    | CheckoutState::PaymentInFlight
                    | CheckoutState::Succeeded
            ),
        }
    }

    /// Replaces the active delivery destination and starts a new validation
    /// generation. Returns the generation token; the orchestrator evicts all
    /// courier quotes, re-runs eligibility, and feeds the result back through
    /// [`apply_eligibility`](Self::apply_eligibility) with this token.
    #[instrument(skip(self, address), fields(draft_id = %self.draft_id))]
    pub fn set_active_address(&mut self, address: ActiveAddress) -> Result<u64, CheckoutError> {
        if self.state != CheckoutState::ConfiguringDelivery {
            return Err(CheckoutError::InvalidOperation(format!(
                "Address cannot change in state {}",
                self.state
            )));
        }
        self.active_address = Some(address);
        let token = self.revalidation_seq.begin();
        debug!(token, "active address replaced, quotes must be re-priced");
        Ok(token)
    }

    /// Applies a fresh per-seller eligibility resolution. A stale `token`
    /// (superseded by a newer edit) is ignored entirely: last write wins by
    /// issuance order. Existing selections that became invalid fall back to
    /// Pickup, then CourierDelivery, then nothing, each emitting a
    /// `DeliveryMethodInvalidated` event with the user-facing reason.
    #[instrument(skip(self, reports), fields(draft_id = %self.draft_id))]
    pub fn apply_eligibility(
        &mut self,
        token: Option<u64>,
        reports: HashMap<Uuid, EligibilityReport>,
    ) -> Result<RevalidationStatus, CheckoutError> {
        if self.state != CheckoutState::ConfiguringDelivery {
            return Err(CheckoutError::InvalidOperation(format!(
                "Eligibility cannot change in state {}",
                self.state
            )));
        }
        if let Some(token) = token {
            if !self.revalidation_seq.is_current(token) {
                debug!(token, "stale eligibility response ignored");
                return Ok(RevalidationStatus::Superseded);
            }
        }

        self.reports = reports;

        let mut fallbacks = Vec::new();
        let current: Vec<(Uuid, DeliveryMethod)> = self
            .selection
            .iter()
            .map(|(seller_id, selection)| (*seller_id, selection.method))
            .collect();

        for (seller_id, method) in current {
            let Some(report) = self.reports.get(&seller_id) else {
                continue;
            };
            let Some(outcome) = revalidate(report, method) else {
                continue;
            };

            match outcome.replacement {
                Some(replacement) => {
                    let fee = match replacement {
                        DeliveryMethod::PersonalDelivery => report.personal.fee,
                        _ => Decimal::ZERO,
                    };
                    self.selection.set(
                        seller_id,
                        SellerSelection {
                            method: replacement,
                            fee,
                            pickup_slot: None,
                            quote: None,
                        },
                    );
                }
                None => {
                    self.selection.remove(seller_id);
                }
            }

            warn!(
                seller_id = %seller_id,
                previous = %outcome.previous,
                reason = %outcome.reason,
                "delivery method invalidated"
            );
            self.outbox.push(Event::DeliveryMethodInvalidated {
                seller_id,
                previous: outcome.previous,
                fallback: outcome.replacement,
                reason: outcome.reason.clone(),
            });
            fallbacks.push(outcome);
        }

        Ok(RevalidationStatus::Applied { fallbacks })
    }

    /// Selects a delivery method for one seller group. Courier selections
    /// start without a fee; [`attach_quote`](Self::attach_quote) prices them.
    #[instrument(skip(self), fields(draft_id = %self.draft_id, seller_id = %seller_id))]
    pub fn select_delivery(
        &mut self,
        seller_id: Uuid,
        method: DeliveryMethod,
    ) -> Result<(), CheckoutError> {
        if self.state != CheckoutState::ConfiguringDelivery {
            return Err(CheckoutError::InvalidOperation(format!(
                "Delivery cannot change in state {}",
                self.state
            )));
        }
        if !self.groups.iter().any(|g| g.seller_id == seller_id) {
            return Err(CheckoutError::InvalidInput(format!(
                "Seller {} is not part of this cart",
                seller_id
            )));
        }
        let report = self.reports.get(&seller_id).ok_or_else(|| {
            CheckoutError::InvalidOperation(format!(
                "No eligibility resolved yet for seller {}",
                seller_id
            ))
        })?;
        let option = report.option(method);
        if !option.is_selectable() {
            return Err(CheckoutError::DeliveryIneligible(
                option
                    .reason
                    .clone()
                    .unwrap_or_else(|| format!("{} is not available", method)),
            ));
        }

        self.selection.set(
            seller_id,
            SellerSelection {
                method,
                fee: option.fee,
                pickup_slot: None,
                quote: None,
            },
        );
        Ok(())
    }

    /// Attaches a courier quote to a courier selection; the seller's delivery
    /// fee becomes the quote's charged amount (estimate plus buffer, never
    /// the bare estimate).
    pub fn attach_quote(
        &mut self,
        seller_id: Uuid,
        quote: CourierQuote,
    ) -> Result<(), CheckoutError> {
        if self.state != CheckoutState::ConfiguringDelivery {
            return Err(CheckoutError::InvalidOperation(format!(
                "Delivery cannot change in state {}",
                self.state
            )));
        }
        if quote.seller_id != seller_id {
            return Err(CheckoutError::InvalidInput(format!(
                "Quote {} belongs to a different seller",
                quote.quote_id
            )));
        }
        if quote.is_expired(Utc::now()) {
            return Err(CheckoutError::QuoteExpired {
                seller_id,
                quote_id: quote.quote_id,
            });
        }
        let selection = self
            .selection
            .get(seller_id)
            .filter(|s| s.method == DeliveryMethod::CourierDelivery)
            .ok_or_else(|| {
                CheckoutError::InvalidOperation(format!(
                    "Seller {} has no courier selection to price",
                    seller_id
                ))
            })?;

        let updated = SellerSelection {
            fee: quote.charged_amount,
            quote: Some(quote),
            ..selection.clone()
        };
        self.selection.set(seller_id, updated);
        Ok(())
    }

    /// Books a pickup slot, validated against the seller's weekly schedule.
    pub fn choose_pickup_slot(
        &mut self,
        seller_id: Uuid,
        schedule: &WeeklySchedule,
        date: NaiveDate,
        slot_id: &str,
    ) -> Result<(), CheckoutError> {
        if self.state != CheckoutState::ConfiguringDelivery {
            return Err(CheckoutError::InvalidOperation(format!(
                "Delivery cannot change in state {}",
                self.state
            )));
        }
        let slot = validate_selection(schedule, date, slot_id)?;
        if !self.selection.set_pickup_slot(seller_id, slot) {
            return Err(CheckoutError::InvalidOperation(format!(
                "Seller {} has no pickup selection",
                seller_id
            )));
        }
        Ok(())
    }

    /// Which sellers still block delivery confirmation, and why.
    pub fn blocking_sellers(&self) -> Vec<(Uuid, String)> {
        let mut blocking = Vec::new();
        let address_ok = self
            .active_address
            .as_ref()
            .map(|a| a.address.is_complete())
            .unwrap_or(false);

        for group in &self.groups {
            let seller_id = group.seller_id;
            let Some(selection) = self.selection.get(seller_id) else {
                blocking.push((seller_id, "No delivery method selected".to_string()));
                continue;
            };
            match selection.method {
                DeliveryMethod::Pickup => {
                    if selection.pickup_slot.is_none() {
                        blocking.push((seller_id, "Pickup time slot not chosen".to_string()));
                    }
                }
                DeliveryMethod::PersonalDelivery | DeliveryMethod::CourierDelivery => {
                    if !address_ok {
                        blocking.push((seller_id, "Delivery address incomplete".to_string()));
                        continue;
                    }
                    let selectable = self
                        .reports
                        .get(&seller_id)
                        .map(|r| r.is_selectable(selection.method))
                        .unwrap_or(false);
                    if !selectable {
                        blocking.push((
                            seller_id,
                            format!("{} is no longer eligible", selection.method),
                        ));
                        continue;
                    }
                    if selection.method == DeliveryMethod::CourierDelivery {
                        match &selection.quote {
                            None => blocking
                                .push((seller_id, "Courier quote not attached".to_string())),
                            Some(quote) if quote.is_expired(Utc::now()) => {
                                blocking.push((seller_id, "Courier quote expired".to_string()))
                            }
                            Some(_) => {}
                        }
                    }
                }
            }
        }
        blocking
    }

    /// `ConfiguringDelivery -> DeliveryConfirmed`. Fails, naming every
    /// blocking seller, unless all groups have a valid selection.
    #[instrument(skip(self), fields(draft_id = %self.draft_id))]
    pub fn confirm_delivery(&mut self) -> Result<(), CheckoutError> {
        if self.state != CheckoutState::ConfiguringDelivery {
            return Err(CheckoutError::InvalidOperation(format!(
                "Cannot confirm delivery in state {}",
                self.state
            )));
        }
        let blocking = self.blocking_sellers();
        if !blocking.is_empty() {
            let detail = blocking
                .iter()
                .map(|(seller_id, reason)| format!("seller {}: {}", seller_id, reason))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(CheckoutError::DeliveryIneligible(detail));
        }

        self.state = CheckoutState::DeliveryConfirmed;
        info!(seller_count = self.groups.len(), "delivery configuration confirmed");
        self.outbox.push(Event::DeliveryConfirmed {
            draft_id: self.draft_id,
            seller_count: self.groups.len(),
        });
        Ok(())
    }

    /// `DeliveryConfirmed -> ConfiguringPayment`. Idempotent: re-entering
    /// payment configuration returns the same setup. For gateway payers the
    /// setup asks for an eagerly created client secret sized to
    /// `subtotal + Σ delivery fees`.
    #[instrument(skip(self), fields(draft_id = %self.draft_id))]
    pub fn begin_payment(&mut self) -> Result<PaymentSetup, CheckoutError> {
        match self.state {
            CheckoutState::DeliveryConfirmed => {
                self.state = CheckoutState::ConfiguringPayment;
                let setup = self.payment_setup();
                if setup.needs_gateway_intent {
                    self.outbox.push(Event::PaymentIntentRequested {
                        draft_id: self.draft_id,
                        amount: setup.total,
                    });
                }
                Ok(setup)
            }
            CheckoutState::ConfiguringPayment => Ok(self.payment_setup()),
            _ => Err(CheckoutError::InvalidOperation(format!(
                "Cannot configure payment in state {}",
                self.state
            ))),
        }
    }

    fn payment_setup(&self) -> PaymentSetup {
        let rail = self.rail();
        PaymentSetup {
            total: self.total(),
            rail,
            needs_gateway_intent: rail == PaymentRail::Gateway && self.payment_intent.is_none(),
        }
    }

    /// Stores the eagerly created gateway intent. The intent must be sized to
    /// the current total; anything else is a stale reservation.
    pub fn attach_intent(&mut self, intent: PaymentIntent) -> Result<(), CheckoutError> {
        if self.state != CheckoutState::ConfiguringPayment {
            return Err(CheckoutError::InvalidOperation(format!(
                "Cannot attach a payment intent in state {}",
                self.state
            )));
        }
        if self.rail() != PaymentRail::Gateway {
            return Err(CheckoutError::InvalidOperation(
                "Ledger payers have no gateway intent".to_string(),
            ));
        }
        if intent.amount != self.total() {
            return Err(CheckoutError::InvalidInput(format!(
                "Intent amount {} does not match order total {}",
                intent.amount,
                self.total()
            )));
        }
        self.payment_intent = Some(intent);
        Ok(())
    }

    /// The backward edge: `ConfiguringPayment -> ConfiguringDelivery`.
    /// Surrenders any reserved gateway intent so a stale total can never be
    /// double-charged; the caller must cancel it at the gateway.
    #[instrument(skip(self), fields(draft_id = %self.draft_id))]
    pub fn back_to_delivery(&mut self) -> Result<Option<PaymentIntent>, CheckoutError> {
        if self.state != CheckoutState::ConfiguringPayment {
            return Err(CheckoutError::InvalidOperation(format!(
                "Cannot return to delivery from state {}",
                self.state
            )));
        }
        self.state = CheckoutState::ConfiguringDelivery;
        let intent = self.payment_intent.take();
        if let Some(intent) = &intent {
            self.outbox.push(Event::PaymentIntentCancelled {
                draft_id: self.draft_id,
                handle: intent.handle.clone(),
            });
        }
        Ok(intent)
    }

    /// The finalized aggregate for the order-creation collaborator. Lines are
    /// immutable from here on.
    pub fn order_draft(&self) -> Result<OrderDraft, CheckoutError> {
        if matches!(
            self.state,
            CheckoutState::ConfiguringDelivery | CheckoutState::Failed
        ) {
            return Err(CheckoutError::InvalidOperation(
                "Delivery is not confirmed".to_string(),
            ));
        }
        Ok(OrderDraft {
            draft_id: self.draft_id,
            buyer_account: self.buyer_account,
            currency: self.currency.clone(),
            groups: self.groups.clone(),
            selection: self.selection.clone(),
        })
    }

    /// `ConfiguringPayment -> PaymentInFlight`. Returns the pending payment
    /// held in memory until success, terminal failure, or a top-up replay.
    #[instrument(skip(self), fields(draft_id = %self.draft_id))]
    pub fn begin_payment_attempt(&mut self) -> Result<PendingPayment, CheckoutError> {
        if self.state != CheckoutState::ConfiguringPayment {
            return Err(CheckoutError::InvalidOperation(format!(
                "Cannot attempt payment in state {}",
                self.state
            )));
        }
        if self.rail() == PaymentRail::Gateway {
            // A reservation sized to any other total is stale and must never
            // be confirmed.
            match &self.payment_intent {
                None => {
                    return Err(CheckoutError::InvalidOperation(
                        "No gateway intent reserved".to_string(),
                    ));
                }
                Some(intent) if intent.amount != self.total() => {
                    return Err(CheckoutError::InvalidOperation(format!(
                        "Reserved intent amount {} no longer matches order total {}",
                        intent.amount,
                        self.total()
                    )));
                }
                Some(_) => {}
            }
        }
        let draft = self.order_draft()?;
        let total = draft.total();
        self.state = CheckoutState::PaymentInFlight;
        Ok(PendingPayment {
            order_draft: draft,
            total_amount: total,
            attempted_at: Utc::now(),
        })
    }

    /// Terminal success: the order exists and the pending payment is gone.
    pub fn payment_succeeded(&mut self, order_id: Uuid) -> Result<(), CheckoutError> {
        if self.state != CheckoutState::PaymentInFlight {
            return Err(CheckoutError::InvalidOperation(format!(
                "No payment in flight in state {}",
                self.state
            )));
        }
        self.state = CheckoutState::Succeeded;
        self.outbox.push(Event::PaymentSucceeded {
            draft_id: self.draft_id,
            order_id,
            rail: self.rail(),
            amount: self.total(),
        });
        self.payment_intent = None;
        Ok(())
    }

    /// Routes a payment failure. Terminal failures end the session and clear
    /// a declined gateway handle; transient gateway errors return to payment
    /// configuration with the handle intact; a ledger shortfall leaves the
    /// payment suspended in flight for the top-up detour.
    #[instrument(skip(self, error), fields(draft_id = %self.draft_id, error = %error))]
    pub fn payment_failed(&mut self, error: &CheckoutError) -> Result<(), CheckoutError> {
        if self.state != CheckoutState::PaymentInFlight {
            return Err(CheckoutError::InvalidOperation(format!(
                "No payment in flight in state {}",
                self.state
            )));
        }
        let terminal = error.is_terminal_payment_failure();
        match error {
            CheckoutError::LedgerInsufficientFunds { .. } => {
                // Suspended; the top-up flow replays the held payment once.
            }
            CheckoutError::GatewayTransient(_) => {
                self.state = CheckoutState::ConfiguringPayment;
            }
            _ if terminal => {
                if error.clears_gateway_handle() {
                    self.payment_intent = None;
                }
                self.state = CheckoutState::Failed;
            }
            _ => {
                self.state = CheckoutState::ConfiguringPayment;
            }
        }
        self.outbox.push(Event::PaymentFailed {
            draft_id: self.draft_id,
            reason: error.to_string(),
            terminal,
        });
        Ok(())
    }
}
