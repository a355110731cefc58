//! Inbound event handlers, keyed by (event type, event source).

use crate::orchestrator::{profile_reply, Orchestrator};
use audience_outbox::{ServerResponse, SignalHit};
use audience_protocol_types::{
    remap_lifecycle_data, ConsentStatus, Event, EventSource, EventType, InboundMessage,
    OutboundMessage, Profile, Traits,
};
use signal_url_builder::{build_signal_request, VisitorIds};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Handler for one kind of inbound event.
pub type HandlerFn = fn(&mut Orchestrator, &Event);

/// Build the routing table. Every inbound message kind has exactly one entry.
pub fn dispatch_table() -> HashMap<(EventType, EventSource), HandlerFn> {
    let mut table: HashMap<(EventType, EventSource), HandlerFn> = HashMap::new();
    table.insert(
        (EventType::Audience, EventSource::RequestContent),
        handle_submit_signal,
    );
    table.insert(
        (EventType::Audience, EventSource::RequestProfile),
        handle_get_visitor_profile,
    );
    table.insert(
        (EventType::Audience, EventSource::RequestIdentity),
        handle_get_identifiers,
    );
    table.insert(
        (EventType::Audience, EventSource::UpdateIdentity),
        handle_set_identifiers,
    );
    table.insert(
        (EventType::Audience, EventSource::RequestReset),
        handle_reset,
    );
    table.insert(
        (EventType::Identity, EventSource::RequestReset),
        handle_identity_reset,
    );
    table.insert(
        (EventType::Configuration, EventSource::ResponseContent),
        handle_configuration_changed,
    );
    table.insert(
        (EventType::Identity, EventSource::SharedStateUpdate),
        handle_identity_changed,
    );
    table.insert(
        (EventType::Lifecycle, EventSource::ResponseContent),
        handle_lifecycle_signal,
    );
    table.insert(
        (EventType::Analytics, EventSource::ResponseContent),
        handle_secondary_service_response,
    );
    table
}

fn handle_submit_signal(orchestrator: &mut Orchestrator, event: &Event) {
    if let InboundMessage::SubmitSignal { traits } = &event.message {
        submit(orchestrator, event, traits);
    }
}

fn handle_lifecycle_signal(orchestrator: &mut Orchestrator, event: &Event) {
    let InboundMessage::LifecycleSignal { context_data } = &event.message else {
        return;
    };

    let forwarding = orchestrator
        .configuration_at(event.sequence)
        .is_some_and(|c| c.forwarding_enabled);
    if forwarding {
        debug!("Lifecycle data is forwarded by the analytics service, not submitting");
        return;
    }

    let traits = remap_lifecycle_data(context_data);
    if traits.is_empty() {
        debug!("No lifecycle data to submit");
        return;
    }
    submit(orchestrator, event, &traits);
}

/// Gate, build and queue a signal.
fn submit(orchestrator: &mut Orchestrator, event: &Event, traits: &Traits) {
    let pair_id = event.pair_id.as_deref();

    let configuration = orchestrator.configuration_at(event.sequence);
    let Some((server, consent)) = configuration
        .as_ref()
        .and_then(|c| c.server().map(|server| (server.to_string(), c.consent)))
    else {
        debug!("No audience server configured, dropping signal");
        orchestrator.reply_direct(pair_id, profile_reply(Profile::new(), pair_id));
        return;
    };

    if consent == ConsentStatus::OptOut {
        debug!("Visitor opted out, dropping signal");
        orchestrator.reply_direct(pair_id, profile_reply(Profile::new(), pair_id));
        return;
    }

    let identity = orchestrator.identity.resolve(event.sequence).into_set();
    let uuid = orchestrator.visitor.uuid();
    let ids = orchestrator.visitor.data_provider_ids();
    let request = build_signal_request(
        &server,
        traits,
        identity.as_ref(),
        configuration.as_ref(),
        VisitorIds {
            uuid: uuid.as_deref(),
            dpid: ids.dpid.as_deref(),
            dpuuid: ids.dpuuid.as_deref(),
        },
        orchestrator.platform.as_deref(),
    );

    if consent == ConsentStatus::Unknown {
        // answered now, so the queued hit is unpaired
        let mut unpaired = event.clone();
        unpaired.pair_id = None;
        let hit = SignalHit::new(unpaired, request.url, request.timeout_secs);
        info!(hit_id = %hit.id, "Consent unknown, queueing signal until it resolves");
        orchestrator.queue.enqueue(hit);
        orchestrator.reply_direct(pair_id, profile_reply(Profile::new(), pair_id));
        return;
    }

    orchestrator.publisher.publish_pending(event.sequence);
    let hit = SignalHit::new(event.clone(), request.url, request.timeout_secs);
    debug!(hit_id = %hit.id, "Queueing signal");
    orchestrator.queue.enqueue(hit);
    orchestrator.queue.resume();
}

fn handle_get_visitor_profile(orchestrator: &mut Orchestrator, event: &Event) {
    let pair_id = event.pair_id.as_deref();
    let profile = orchestrator.visitor.visitor_profile();
    orchestrator.respond(pair_id, profile_reply(profile, pair_id));
}

fn handle_get_identifiers(orchestrator: &mut Orchestrator, event: &Event) {
    let pair_id = event.pair_id.as_deref();
    let ids = orchestrator.visitor.data_provider_ids();
    let profile = orchestrator.visitor.visitor_profile();
    orchestrator.respond(
        pair_id,
        OutboundMessage::IdentityResponse {
            profile,
            dpid: ids.dpid,
            dpuuid: ids.dpuuid,
            correlation_id: pair_id.map(str::to_string),
        },
    );
}

fn handle_set_identifiers(orchestrator: &mut Orchestrator, event: &Event) {
    let InboundMessage::SetIdentifiers { dpid, dpuuid } = &event.message else {
        return;
    };
    orchestrator.visitor.set_dpid(Some(dpid.clone()));
    orchestrator.visitor.set_dpuuid(Some(dpuuid.clone()));
    orchestrator.publish_state(event.sequence);
}

fn handle_reset(orchestrator: &mut Orchestrator, event: &Event) {
    orchestrator.reset(event.sequence, true);
}

fn handle_identity_reset(orchestrator: &mut Orchestrator, event: &Event) {
    orchestrator.reset(event.sequence, false);
}

fn handle_configuration_changed(orchestrator: &mut Orchestrator, event: &Event) {
    let InboundMessage::ConfigurationChanged(status) = &event.message else {
        return;
    };
    match status.as_set() {
        Some(configuration) => orchestrator.apply_consent(configuration, event.sequence),
        None => debug!("Configuration pending, consent unchanged"),
    }
}

fn handle_identity_changed(_orchestrator: &mut Orchestrator, event: &Event) {
    debug!(sequence = ?event.sequence, "Identity snapshot recorded");
}

fn handle_secondary_service_response(orchestrator: &mut Orchestrator, event: &Event) {
    let InboundMessage::SecondaryServiceResponse { body } = &event.message else {
        return;
    };

    let forwarding = orchestrator
        .configuration_at(event.sequence)
        .is_some_and(|c| c.forwarding_enabled);
    if !forwarding {
        debug!("Forwarding disabled, ignoring analytics response");
        return;
    }

    let response = ServerResponse::parse(Some(body));
    if response.is_empty() {
        warn!("Analytics response carried no audience data");
    }
    orchestrator.apply_response(response, event.sequence, event.pair_id.as_deref());
}
