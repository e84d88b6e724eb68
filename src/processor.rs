//! Per-delivery processing.
//!
//! A delivery moves from arriving (partial) to readable, is optionally
//! decoded, accepted unless the sender already settled it, then advanced and
//! settled. Credit replenishment and the remaining-count check run after
//! settlement.

use log::{debug, info, warn};

use crate::{
    context::ReceiverContext,
    event::Delivery,
    intent::{Intent, Notice},
    message::{MessageDecoder, extract_single_string},
};

/// Result of offering a delivery to the processor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The delivery is not yet readable or still partial.
    Pending,
    /// The delivery arrived on an inactive link or was already settled.
    Ignored,
    /// The delivery was settled.
    Settled,
}

/// Drives a single delivery to settlement.
#[derive(Clone, Debug, Default)]
pub struct DeliveryProcessor<D> {
    decoder: D,
}

impl<D: MessageDecoder> DeliveryProcessor<D> {
    /// Create a processor decoding payloads with `decoder`.
    #[must_use]
    pub fn new(decoder: D) -> Self { Self { decoder } }

    /// Process `delivery`, appending the resulting intents to `out`.
    ///
    /// `link_credit` is the credit outstanding on the link when the delivery
    /// arrived.
    pub fn process(
        &self,
        ctx: &mut ReceiverContext,
        delivery: &Delivery,
        link_credit: u32,
        out: &mut Vec<Intent>,
    ) -> DeliveryOutcome {
        if !delivery.is_ready() {
            debug!(
                "delivery not ready: id={}, readable={}, partial={}",
                delivery.id, delivery.readable, delivery.partial
            );
            return DeliveryOutcome::Pending;
        }
        if !ctx.endpoints.accepts_deliveries() {
            warn!("ignoring delivery on inactive link: id={}", delivery.id);
            return DeliveryOutcome::Ignored;
        }
        if ctx.already_settled(delivery.id) {
            warn!("ignoring already settled delivery: id={}", delivery.id);
            return DeliveryOutcome::Ignored;
        }

        if !ctx.quiet {
            self.decode(ctx, delivery, out);
        }
        if !delivery.settled {
            out.push(Intent::Accept {
                delivery: delivery.id,
            });
        }
        out.push(Intent::Advance {
            delivery: delivery.id,
        });
        out.push(Intent::Settle {
            delivery: delivery.id,
        });
        ctx.last_settled = Some(delivery.id);
        ctx.summary.deliveries_settled += 1;
        #[cfg(feature = "metrics")]
        crate::metrics::inc_settled();
        debug!(
            "delivery settled: id={}, remotely_settled={}",
            delivery.id, delivery.settled
        );

        if let Some(grant) = ctx.credit.replenish(link_credit) {
            out.push(grant.into_intent());
        }
        ctx.remaining.record_delivery();
        if ctx.remaining.is_exhausted() && !ctx.shutdown_requested {
            info!(
                "message target reached, closing link: settled={}",
                ctx.summary.deliveries_settled
            );
            ctx.shutdown_requested = true;
            out.extend(ctx.endpoints.close_sequence());
        }
        DeliveryOutcome::Settled
    }

    fn decode(&self, ctx: &mut ReceiverContext, delivery: &Delivery, out: &mut Vec<Intent>) {
        let pending = delivery.pending_bytes();
        let read = pending.min(ctx.max_read_bytes);
        out.push(Intent::Recv {
            delivery: delivery.id,
            max_bytes: ctx.max_read_bytes,
        });
        if read < pending {
            warn!(
                "payload truncated: id={}, read={read}, pending={pending}",
                delivery.id
            );
            ctx.summary.truncated += 1;
            #[cfg(feature = "metrics")]
            crate::metrics::inc_truncated();
            out.push(Intent::Report(Notice::Truncated {
                delivery: delivery.id,
                read,
                pending,
            }));
        }

        ctx.scratch.clear();
        let notice = match self
            .decoder
            .decode_into(&delivery.payload[..read], &mut ctx.scratch)
        {
            Ok(()) => extract_single_string(&ctx.scratch.body)
                .map_or(Notice::Received, |text| Notice::Message(text.to_owned())),
            Err(error) => {
                debug!("payload decode failed: id={}, error={error}", delivery.id);
                ctx.summary.decode_failures += 1;
                #[cfg(feature = "metrics")]
                crate::metrics::inc_decode_failures();
                Notice::Received
            }
        };
        out.push(Intent::Report(notice));
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{
        config::ReceiverConfig,
        endpoint::EndpointKind,
        message::{AmqpMessageDecoder, Message, MessageDecodeError},
    };

    struct Rejecting;

    impl MessageDecoder for Rejecting {
        fn decode_into(&self, _: &[u8], _: &mut Message) -> Result<(), MessageDecodeError> {
            Err(MessageDecodeError::UnknownSection { code: 0x99 })
        }
    }

    #[fixture]
    fn context() -> ReceiverContext {
        // Context with every endpoint open and no message target
        let mut context = ReceiverContext::new(&ReceiverConfig::default().with_count(0))
            .expect("valid config");
        context
            .endpoints
            .open_sequence(&context.settings.clone())
            .expect("fresh endpoints");
        for kind in EndpointKind::ALL {
            context.endpoints.on_remote_opened(kind).expect("opening");
        }
        context
    }

    fn text(id: u32) -> Delivery {
        Delivery::complete(id, Message::text("body").to_bytes().freeze())
    }

    #[rstest]
    fn partial_delivery_is_pending(mut context: ReceiverContext) {
        let mut out = Vec::new();
        let outcome = DeliveryProcessor::new(AmqpMessageDecoder).process(
            &mut context,
            &text(0).partial(),
            99,
            &mut out,
        );
        assert_eq!(outcome, DeliveryOutcome::Pending);
        assert!(out.is_empty());
    }

    #[rstest]
    fn duplicate_delivery_is_ignored(mut context: ReceiverContext) {
        let processor = DeliveryProcessor::new(AmqpMessageDecoder);
        let mut out = Vec::new();
        assert_eq!(
            processor.process(&mut context, &text(0), 99, &mut out),
            DeliveryOutcome::Settled
        );
        out.clear();
        assert_eq!(
            processor.process(&mut context, &text(0), 99, &mut out),
            DeliveryOutcome::Ignored
        );
        assert!(out.is_empty());
    }

    #[rstest]
    fn decoder_failure_is_counted(mut context: ReceiverContext) {
        let mut out = Vec::new();
        let outcome = DeliveryProcessor::new(Rejecting).process(
            &mut context,
            &Delivery::complete(0, Bytes::from_static(b"anything")),
            99,
            &mut out,
        );
        assert_eq!(outcome, DeliveryOutcome::Settled);
        assert!(out.contains(&Intent::Report(Notice::Received)));
        assert_eq!(context.summary.decode_failures, 1);
    }

    #[rstest]
    fn scratch_is_cleared_between_deliveries(mut context: ReceiverContext) {
        let processor = DeliveryProcessor::new(AmqpMessageDecoder);
        let mut out = Vec::new();
        processor.process(&mut context, &text(0), 99, &mut out);
        out.clear();
        processor.process(
            &mut context,
            &Delivery::complete(1, Message::new().to_bytes().freeze()),
            99,
            &mut out,
        );
        assert!(out.contains(&Intent::Report(Notice::Received)));
    }
}
