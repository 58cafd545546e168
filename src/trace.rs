//! Simulation trace: the deterministic, line-oriented record of everything
//! the engine does. Diagnostics go through `log`; this channel is the output.

use std::fmt;
use std::io::{self, Write};

use serde::Serialize;

use crate::world::{
    Behavior, CorporationId, GarbageId, GarbageKind, HarborId, Reward, ShipId, TaskId, TileId,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    ShipMoved {
        ship: ShipId,
        from: TileId,
        to: TileId,
        distance: u32,
        fuel: u32,
    },
    BehaviorChanged {
        ship: ShipId,
        from: Behavior,
        to: Behavior,
    },
    RefuelRedirect {
        ship: ShipId,
        tile: TileId,
    },
    GarbageCollected {
        ship: ShipId,
        garbage: GarbageId,
        kind: GarbageKind,
        amount: u32,
        left: u32,
    },
    Cooperated {
        corporation: CorporationId,
        partner: CorporationId,
        ship: ShipId,
        partner_ship: ShipId,
    },
    Refueled {
        ship: ShipId,
        harbor: HarborId,
        cost: i64,
    },
    RefuelFailed {
        ship: ShipId,
        harbor: HarborId,
        cost: i64,
        credits: i64,
    },
    StationClosed {
        harbor: HarborId,
    },
    TransferStarted {
        provider: ShipId,
        receiver: ShipId,
        ticks: u32,
    },
    TransferCompleted {
        provider: ShipId,
        receiver: ShipId,
        amount: u32,
    },
    TransferAborted {
        provider: ShipId,
        receiver: ShipId,
    },
    Unloaded {
        ship: ShipId,
        harbor: HarborId,
        kind: GarbageKind,
        amount: u32,
        earned: i64,
    },
    Repaired {
        ship: ShipId,
        harbor: HarborId,
        cost: i64,
    },
    RepairFailed {
        ship: ShipId,
        harbor: HarborId,
        cost: i64,
        credits: i64,
    },
    BuyerNominated {
        corporation: CorporationId,
        ship: ShipId,
    },
    ShipPurchased {
        corporation: CorporationId,
        buyer: ShipId,
        harbor: HarborId,
        cost: i64,
        delivery_in: u32,
    },
    PurchaseFailed {
        corporation: CorporationId,
        buyer: ShipId,
        harbor: HarborId,
        cost: i64,
        credits: i64,
    },
    ShipDelivered {
        corporation: CorporationId,
        ship: ShipId,
        tile: TileId,
    },
    TaskAssigned {
        task: TaskId,
        ship: ShipId,
        target: TileId,
    },
    TaskCompleted {
        task: TaskId,
        ship: ShipId,
        reward: Option<Reward>,
    },
    TaskFailed {
        task: TaskId,
        ship: ShipId,
    },
    GarbageDrifted {
        garbage: GarbageId,
        from: TileId,
        to: TileId,
    },
    ShipDrifted {
        ship: ShipId,
        from: TileId,
        to: TileId,
    },
    TrackerAttached {
        corporation: CorporationId,
        garbage: GarbageId,
        ship: ShipId,
    },
    RestrictionStarted {
        tile: TileId,
        radius: u32,
    },
    RestrictionLifted {
        tile: TileId,
        radius: u32,
    },
    TyphoonHit {
        ship: ShipId,
        strength: u32,
    },
    CargoSpilled {
        ship: ShipId,
        kind: GarbageKind,
        amount: u32,
        garbage: Option<GarbageId>,
    },
    PirateAttack {
        ship: ShipId,
        lost: u32,
    },
    OilSpilled {
        tile: TileId,
        garbage: GarbageId,
        amount: u32,
    },
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::ShipMoved {
                ship,
                from,
                to,
                distance,
                fuel,
            } => write!(
                f,
                "{ship} moved from {from} to {to} ({distance} tiles, fuel {fuel})"
            ),
            TraceEvent::BehaviorChanged { ship, from, to } => {
                write!(f, "{ship} switched from {from} to {to}")
            }
            TraceEvent::RefuelRedirect { ship, tile } => {
                write!(f, "{ship} at {tile} turns back to refuel")
            }
            TraceEvent::GarbageCollected {
                ship,
                garbage,
                kind,
                amount,
                left,
            } => write!(
                f,
                "{ship} collected {amount} {kind} from {garbage} ({left} left)"
            ),
            TraceEvent::Cooperated {
                corporation,
                partner,
                ship,
                partner_ship,
            } => write!(
                f,
                "{corporation} cooperated with {partner} ({ship} met {partner_ship})"
            ),
            TraceEvent::Refueled { ship, harbor, cost } => {
                write!(f, "{ship} refueled at {harbor} for {cost} credits")
            }
            TraceEvent::RefuelFailed {
                ship,
                harbor,
                cost,
                credits,
            } => write!(
                f,
                "{ship} could not refuel at {harbor}: costs {cost}, has {credits}"
            ),
            TraceEvent::StationClosed { harbor } => {
                write!(f, "refueling station at {harbor} closed")
            }
            TraceEvent::TransferStarted {
                provider,
                receiver,
                ticks,
            } => write!(f, "{provider} starts refueling {receiver} ({ticks} ticks)"),
            TraceEvent::TransferCompleted {
                provider,
                receiver,
                amount,
            } => write!(f, "{provider} transferred {amount} fuel to {receiver}"),
            TraceEvent::TransferAborted { provider, receiver } => {
                write!(f, "{provider} aborted refueling {receiver}")
            }
            TraceEvent::Unloaded {
                ship,
                harbor,
                kind,
                amount,
                earned,
            } => write!(
                f,
                "{ship} unloaded {amount} {kind} at {harbor} for {earned} credits"
            ),
            TraceEvent::Repaired { ship, harbor, cost } => {
                write!(f, "{ship} repaired at {harbor} for {cost} credits")
            }
            TraceEvent::RepairFailed {
                ship,
                harbor,
                cost,
                credits,
            } => write!(
                f,
                "{ship} could not be repaired at {harbor}: costs {cost}, has {credits}"
            ),
            TraceEvent::BuyerNominated { corporation, ship } => {
                write!(f, "{corporation} sends {ship} to buy a ship")
            }
            TraceEvent::ShipPurchased {
                corporation,
                buyer,
                harbor,
                cost,
                delivery_in,
            } => write!(
                f,
                "{corporation} bought a ship at {harbor} via {buyer} for {cost} credits, delivery in {delivery_in} ticks"
            ),
            TraceEvent::PurchaseFailed {
                corporation,
                buyer,
                harbor,
                cost,
                credits,
            } => write!(
                f,
                "{corporation} could not buy at {harbor} via {buyer}: costs {cost}, has {credits}"
            ),
            TraceEvent::ShipDelivered {
                corporation,
                ship,
                tile,
            } => write!(f, "{ship} delivered to {corporation} at {tile}"),
            TraceEvent::TaskAssigned { task, ship, target } => {
                write!(f, "{task} assigned to {ship}, target {target}")
            }
            TraceEvent::TaskCompleted { task, ship, reward } => match reward {
                Some(reward) => write!(f, "{ship} completed {task}, reward {reward:?}"),
                None => write!(f, "{ship} completed {task}"),
            },
            TraceEvent::TaskFailed { task, ship } => write!(f, "{ship} failed {task}"),
            TraceEvent::GarbageDrifted { garbage, from, to } => {
                write!(f, "{garbage} drifted from {from} to {to}")
            }
            TraceEvent::ShipDrifted { ship, from, to } => {
                write!(f, "{ship} drifted from {from} to {to}")
            }
            TraceEvent::TrackerAttached {
                corporation,
                garbage,
                ship,
            } => write!(f, "{corporation} attached a tracker to {garbage} from {ship}"),
            TraceEvent::RestrictionStarted { tile, radius } => {
                write!(f, "restriction around {tile} (radius {radius}) started")
            }
            TraceEvent::RestrictionLifted { tile, radius } => {
                write!(f, "restriction around {tile} (radius {radius}) lifted")
            }
            TraceEvent::TyphoonHit { ship, strength } => {
                write!(f, "typhoon of strength {strength} hit {ship}")
            }
            TraceEvent::CargoSpilled {
                ship,
                kind,
                amount,
                garbage,
            } => match garbage {
                Some(garbage) => write!(f, "{ship} spilled {amount} {kind} as {garbage}"),
                None => write!(f, "{ship} spilled {amount} {kind}, lost at sea"),
            },
            TraceEvent::PirateAttack { ship, lost } => {
                write!(f, "pirates attacked {ship}, {lost} cargo lost")
            }
            TraceEvent::OilSpilled {
                tile,
                garbage,
                amount,
            } => write!(f, "oil spill of {amount} at {tile} as {garbage}"),
        }
    }
}

/// Receiver of trace events. Injected into every phase.
pub trait TraceSink {
    fn record(&mut self, tick: u64, event: TraceEvent);
}

/// Keeps every event in memory. Used by tests and determinism checks.
#[derive(Debug, Default)]
pub struct MemoryTrace {
    events: Vec<(u64, TraceEvent)>,
}

impl MemoryTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[(u64, TraceEvent)] {
        &self.events
    }

    pub fn lines(&self) -> Vec<String> {
        self.events
            .iter()
            .map(|(tick, event)| format_line(*tick, event))
            .collect()
    }

    pub fn matching<'a>(
        &'a self,
        predicate: impl Fn(&TraceEvent) -> bool + 'a,
    ) -> impl Iterator<Item = &'a (u64, TraceEvent)> + 'a {
        self.events.iter().filter(move |(_, event)| predicate(event))
    }
}

impl TraceSink for MemoryTrace {
    fn record(&mut self, tick: u64, event: TraceEvent) {
        self.events.push((tick, event));
    }
}

pub fn format_line(tick: u64, event: &TraceEvent) -> String {
    format!("[tick {tick:>5}] {event}")
}

/// Writes one text line per event. The first I/O error is kept and reported by
/// [`WriterTrace::finish`]; later events are dropped.
pub struct WriterTrace<W: Write> {
    out: W,
    error: Option<io::Error>,
}

impl<W: Write> WriterTrace<W> {
    pub fn new(out: W) -> Self {
        Self { out, error: None }
    }

    pub fn finish(mut self) -> io::Result<W> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> TraceSink for WriterTrace<W> {
    fn record(&mut self, tick: u64, event: TraceEvent) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = writeln!(self.out, "{}", format_line(tick, &event)) {
            self.error = Some(err);
        }
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    tick: u64,
    #[serde(flatten)]
    event: &'a TraceEvent,
}

/// Writes one JSON object per line.
pub struct JsonLinesTrace<W: Write> {
    out: W,
    error: Option<io::Error>,
}

impl<W: Write> JsonLinesTrace<W> {
    pub fn new(out: W) -> Self {
        Self { out, error: None }
    }

    pub fn finish(mut self) -> io::Result<W> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> TraceSink for JsonLinesTrace<W> {
    fn record(&mut self, tick: u64, event: TraceEvent) {
        if self.error.is_some() {
            return;
        }
        let line = JsonLine {
            tick,
            event: &event,
        };
        let result = serde_json::to_writer(&mut self.out, &line)
            .map_err(io::Error::from)
            .and_then(|_| self.out.write_all(b"\n"));
        if let Err(err) = result {
            self.error = Some(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_trace_prefixes_tick() {
        let mut trace = WriterTrace::new(Vec::new());
        trace.record(
            3,
            TraceEvent::Refueled {
                ship: ShipId::new(2),
                harbor: HarborId::new(1),
                cost: 50,
            },
        );
        let out = String::from_utf8(trace.finish().unwrap()).unwrap();
        assert_eq!(
            out,
            "[tick     3] ship 2 refueled at harbor 1 for 50 credits\n"
        );
    }

    #[test]
    fn json_lines_carry_tag_and_tick() {
        let mut trace = JsonLinesTrace::new(Vec::new());
        trace.record(
            7,
            TraceEvent::StationClosed {
                harbor: HarborId::new(4),
            },
        );
        let out = String::from_utf8(trace.finish().unwrap()).unwrap();
        let value: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["tick"], 7);
        assert_eq!(value["event"], "station_closed");
        assert_eq!(value["harbor"], 4);
    }
}
