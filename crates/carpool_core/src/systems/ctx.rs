//! Per-event dispatch context.
//!
//! Narrow bevy systems (`Query<(&mut Trip, ...)>` gated by `run_if`) would
//! fit handlers that only ever touch the one entity named by
//! `CurrentEvent`. The matching round is necessarily wide, though -- it scans
//! every active request and available driver at once -- so instead of
//! stretching a single system's parameter list to cover that, every
//! resource the handlers need is pulled out of the `World` once per
//! dispatch into this context struct, handed to a plain function per event
//! kind, and put back when the event finishes.

use bevy_ecs::prelude::World;

use crate::clock::{Event, EventKind};
use crate::ecs::DriverTypes;
use crate::matching::{AssignmentConfig, FcfsMatcher, GroupEnumerator, ThresholdPolicy};
use crate::registries::Registries;
use crate::routing::oracle::MapOracle;
use crate::scenario::{
    ArrivalMode, ArrivalRng, ArrivalStream, CarpoolParams, CostParams, FleetLimits, Oracle,
    PatienceRng, Policy, RegionBounds, RequestSpawnParams,
};
use crate::telemetry::Metrics;
use crate::clock::SimulationClock;
use crate::clustering::DestinationClusterer;

use super::driver_arrival::handle_driver_arrival;
use super::pickup_complete::handle_pickup_complete;
use super::request_arrival::handle_request_arrival;
use super::request_quit::handle_request_quit;
use super::threshold_reached::handle_threshold_reached;
use super::trip_complete::handle_trip_complete;

pub struct HandlerCtx<'w> {
    pub world: &'w mut World,
    pub registries: Registries,
    pub metrics: Metrics,
    pub clock: SimulationClock,
    pub arrival_stream: ArrivalStream,
    pub arrival_mode: ArrivalMode,
    pub arrival_rng: ArrivalRng,
    pub patience_rng: PatienceRng,
    pub spawn_params: RequestSpawnParams,
    pub carpool: CarpoolParams,
    pub costs: CostParams,
    pub bounds: RegionBounds,
    pub fleet: FleetLimits,
    pub driver_types: DriverTypes,
    pub policy: Policy,
    pub oracle: Oracle,
    pub clusterer: DestinationClusterer,
    pub group_enum: GroupEnumerator,
    pub assignment_config: AssignmentConfig,
    pub threshold_policy: ThresholdPolicy,
    pub fcfs: FcfsMatcher,
}

impl<'w> HandlerCtx<'w> {
    pub fn oracle(&self) -> &dyn MapOracle {
        self.oracle.0.as_ref()
    }
}

/// Pops nothing; dispatches an already-popped event against `world`,
/// juggling every resource the handlers need out of and back into the
/// `World` around the call.
pub fn dispatch_event(world: &mut World, event: Event) {
    let registries = world.remove_resource::<Registries>().expect("Registries resource");
    let metrics = world.remove_resource::<Metrics>().expect("Metrics resource");
    let clock = world.remove_resource::<SimulationClock>().expect("SimulationClock resource");
    let arrival_stream = world.remove_resource::<ArrivalStream>().expect("ArrivalStream resource");
    let arrival_mode = *world.resource::<ArrivalMode>();
    let arrival_rng = world.remove_resource::<ArrivalRng>().expect("ArrivalRng resource");
    let patience_rng = world.remove_resource::<PatienceRng>().expect("PatienceRng resource");
    let spawn_params = *world.resource::<RequestSpawnParams>();
    let carpool = *world.resource::<CarpoolParams>();
    let costs = *world.resource::<CostParams>();
    let bounds = *world.resource::<RegionBounds>();
    let fleet = *world.resource::<FleetLimits>();
    let driver_types = world.resource::<DriverTypes>().clone();
    let policy = *world.resource::<Policy>();
    let oracle = world.remove_resource::<Oracle>().expect("Oracle resource");
    let clusterer = world.remove_resource::<DestinationClusterer>().expect("DestinationClusterer resource");
    let group_enum = world.remove_resource::<GroupEnumerator>().expect("GroupEnumerator resource");
    let assignment_config = *world.resource::<AssignmentConfig>();
    let threshold_policy = world.remove_resource::<ThresholdPolicy>().expect("ThresholdPolicy resource");
    let fcfs = world.remove_resource::<FcfsMatcher>().expect("FcfsMatcher resource");

    let mut ctx = HandlerCtx {
        world,
        registries,
        metrics,
        clock,
        arrival_stream,
        arrival_mode,
        arrival_rng,
        patience_rng,
        spawn_params,
        carpool,
        costs,
        bounds,
        fleet,
        driver_types,
        policy,
        oracle,
        clusterer,
        group_enum,
        assignment_config,
        threshold_policy,
        fcfs,
    };

    match event.kind {
        EventKind::RequestArrival => handle_request_arrival(&mut ctx, event),
        EventKind::DriverArrival => handle_driver_arrival(&mut ctx, event),
        EventKind::RequestQuit => handle_request_quit(&mut ctx, event),
        EventKind::ThresholdReached => handle_threshold_reached(&mut ctx, event),
        EventKind::PickupComplete => handle_pickup_complete(&mut ctx, event),
        EventKind::TripComplete => handle_trip_complete(&mut ctx, event),
    }

    let HandlerCtx {
        world,
        registries,
        metrics,
        clock,
        arrival_stream,
        arrival_rng,
        patience_rng,
        oracle,
        clusterer,
        group_enum,
        threshold_policy,
        fcfs,
        ..
    } = ctx;

    world.insert_resource(registries);
    world.insert_resource(metrics);
    world.insert_resource(clock);
    world.insert_resource(arrival_stream);
    world.insert_resource(arrival_rng);
    world.insert_resource(patience_rng);
    world.insert_resource(oracle);
    world.insert_resource(clusterer);
    world.insert_resource(group_enum);
    world.insert_resource(threshold_policy);
    world.insert_resource(fcfs);
}
