//! # Score normalizer and IR
//!
//! `spec.md` §3.6, §4.H. Resolves the unresolved [`PosValue`]s an evaluated
//! [`ScoreValue`] carries into exact absolute rationals under a mutable
//! meter map, then emits the serde-serializable [`ScoreIr`] document
//! described in §6.3. Grounded on the teacher's own two-pass layout resolver
//! (collect durations, then walk again to place everything at an absolute
//! offset) — the same two-phase shape, generalized from bar/measure
//! placement to an open-ended meter map.

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::rational::Rat;
use crate::source::Span;
use crate::value::{ClipValue, EventKind, PosValue, ScoreValue};
use serde::Serialize;

pub const IR_VERSION: i64 = 4;

#[derive(Debug, Clone, Serialize)]
pub struct TakoHeader {
    pub ir_version: i64,
    pub generator: String,
    pub source_hash: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetaIr {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anacrusis: Option<Rat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TempoEntryIr {
    pub at: Rat,
    pub bpm: f64,
    pub unit: Rat,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeterEntryIr {
    pub at: Rat,
    pub numerator: i64,
    pub denominator: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SoundIr {
    pub id: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum EventIr {
    Note { pitch: i32, start: Rat, dur: Rat },
    Chord { pitches: Vec<i32>, start: Rat, dur: Rat },
    Hit { sound: String, start: Rat, dur: Rat },
    Rest { start: Rat, dur: Rat },
    Cc { controller: i64, value: i64, start: Rat },
    Automation { param: String, value: f64, start: Rat, dur: Rat },
    Marker { kind: String, label: String, start: Rat },
}

impl EventIr {
    fn start(&self) -> Rat {
        match self {
            EventIr::Note { start, .. }
            | EventIr::Chord { start, .. }
            | EventIr::Hit { start, .. }
            | EventIr::Rest { start, .. }
            | EventIr::Cc { start, .. }
            | EventIr::Automation { start, .. }
            | EventIr::Marker { start, .. } => *start,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClipIr {
    pub events: Vec<EventIr>,
    pub length: Rat,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlacementIr {
    pub at: Rat,
    pub clip: ClipIr,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackIr {
    pub name: String,
    pub role: String,
    pub sound: String,
    pub placements: Vec<PlacementIr>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkerIr {
    pub at: Rat,
    pub kind: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreIr {
    pub tako: TakoHeader,
    pub meta: MetaIr,
    pub tempo_map: Vec<TempoEntryIr>,
    pub meter_map: Vec<MeterEntryIr>,
    pub sounds: Vec<SoundIr>,
    pub tracks: Vec<TrackIr>,
    pub markers: Vec<MarkerIr>,
}

/// One resolved `(position, numerator, denominator)` meter change, used as
/// scratch state while walking the meter/tempo/event positions in order.
struct MeterChange {
    at: Rat,
    numerator: i64,
    denominator: i64,
}

/// Resolves `score.meter` into an ordered, bar-aligned meter map and returns
/// a closure-like resolver usable for every other position in the score
/// (§4.H steps 1-3). `span` anchors diagnostics that have no better site.
pub fn normalize(
    score: &ScoreValue,
    generator: &str,
    source_hash: &str,
    fallback_span: Span,
    diagnostics: &mut Vec<Diagnostic>,
) -> ScoreIr {
    let meter_map = resolve_meter_map(score, fallback_span, diagnostics);
    let resolve = |pos: &PosValue, span: Span| resolve_position(pos, &meter_map, span, diagnostics);

    let mut tempo_map: Vec<TempoEntryIr> = score
        .tempo
        .iter()
        .map(|t| TempoEntryIr { at: resolve(&t.pos, fallback_span), bpm: t.bpm, unit: Rat::make(1, 4).unwrap() })
        .collect();
    tempo_map.sort_by(|a, b| a.at.compare(&b.at));
    if !tempo_map.iter().any(|t| t.at.is_zero()) {
        diagnostics.push(Diagnostic::warning(
            DiagnosticCode::MeterNotAtBarStart,
            "no tempo entry at 0/1; synthesizing 120bpm at 0",
            fallback_span,
        ));
        tempo_map.insert(0, TempoEntryIr { at: Rat::ZERO, bpm: 120.0, unit: Rat::make(1, 4).unwrap() });
    }

    let mut meter_map_ir: Vec<MeterEntryIr> = meter_map
        .iter()
        .map(|m| MeterEntryIr { at: m.at, numerator: m.numerator, denominator: m.denominator })
        .collect();
    meter_map_ir.sort_by(|a, b| a.at.compare(&b.at));

    let sounds: Vec<SoundIr> = score.sounds.iter().map(|s| SoundIr { id: s.id.clone(), kind: s.kind.clone() }).collect();

    let tracks: Vec<TrackIr> = score
        .tracks
        .iter()
        .map(|t| TrackIr {
            name: t.name.clone(),
            role: t.role.clone(),
            sound: t.sound.clone(),
            placements: t
                .placements
                .iter()
                .map(|p| {
                    let clip_at = resolve(&p.pos, fallback_span);
                    PlacementIr { at: clip_at, clip: resolve_clip(&p.clip, clip_at, &meter_map, diagnostics) }
                })
                .collect(),
        })
        .collect();

    let markers: Vec<MarkerIr> = score
        .markers
        .iter()
        .map(|m| MarkerIr { at: resolve(&m.pos, fallback_span), kind: m.kind.clone(), label: m.label.clone() })
        .collect();

    ScoreIr {
        tako: TakoHeader { ir_version: IR_VERSION, generator: generator.to_string(), source_hash: source_hash.to_string() },
        meta: MetaIr {
            title: lookup_meta_str(score, "title"),
            artist: lookup_meta_str(score, "artist"),
            album: lookup_meta_str(score, "album"),
            copyright: lookup_meta_str(score, "copyright"),
            anacrusis: lookup_meta_rat(score, "anacrusis"),
        },
        tempo_map,
        meter_map: meter_map_ir,
        sounds,
        tracks,
        markers,
    }
}

fn lookup_meta_str(score: &ScoreValue, key: &str) -> Option<String> {
    score.meta.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.to_string())
}

fn lookup_meta_rat(score: &ScoreValue, key: &str) -> Option<Rat> {
    use crate::value::Value;
    score.meta.fields.iter().find_map(|(k, v)| {
        if k != key {
            return None;
        }
        match v {
            Value::Dur(r) => Some(*r),
            Value::Int(n) => Some(Rat::from_int(*n)),
            _ => None,
        }
    })
}

/// §4.H step 1: cumulative bar-length walk. Each entry is `(bar b, beat 1)`;
/// a meter change must land exactly on a bar boundary under the meter active
/// immediately before it.
fn resolve_meter_map(score: &ScoreValue, fallback_span: Span, diagnostics: &mut Vec<Diagnostic>) -> Vec<MeterChange> {
    let mut entries: Vec<_> = score.meter.iter().collect();
    entries.sort_by_key(|m| match &m.pos {
        PosValue::Ref { bar, .. } => *bar,
        _ => 0,
    });

    let mut resolved = Vec::new();
    let mut cumulative = Rat::ZERO;
    let mut active = (4i64, 4i64);
    let mut last_bar = 1i64;

    for entry in &entries {
        let (bar, beat) = match &entry.pos {
            PosValue::Ref { bar, beat } => (*bar, *beat),
            _ => (1, 1),
        };
        if beat != 1 {
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::MeterNotAtBarStart,
                format!("meter change at {bar}:{beat} does not land on a bar boundary"),
                fallback_span,
            ));
            continue;
        }
        let bars_elapsed = bar - last_bar;
        if bars_elapsed < 0 {
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::MeterNotAtBarStart,
                "meter entries must be given in non-decreasing bar order",
                fallback_span,
            ));
            continue;
        }
        let bar_length = Rat::make(active.0, active.1).unwrap_or(Rat::ONE);
        cumulative = cumulative.add(bar_length.mul(Rat::from_int(bars_elapsed)));
        resolved.push(MeterChange { at: cumulative, numerator: entry.numerator, denominator: entry.denominator });
        active = (entry.numerator, entry.denominator);
        last_bar = bar;
    }

    if resolved.is_empty() || !resolved[0].at.is_zero() {
        diagnostics.push(Diagnostic::warning(
            DiagnosticCode::MeterNotAtBarStart,
            "no meter entry at 0/1; synthesizing 4/4 at 0",
            fallback_span,
        ));
        resolved.insert(0, MeterChange { at: Rat::ZERO, numerator: 4, denominator: 4 });
    }
    resolved
}

/// Finds the meter active at (i.e. most recently changed at or before) `at`.
fn active_meter_at(meter_map: &[MeterChange], at: Rat) -> (i64, i64) {
    let mut current = (4i64, 4i64);
    for entry in meter_map {
        if entry.at.compare(&at) != std::cmp::Ordering::Greater {
            current = (entry.numerator, entry.denominator);
        } else {
            break;
        }
    }
    current
}

/// §4.H steps 1-3: a single position-resolution function reused for meter,
/// tempo, placement, event and marker positions alike.
fn resolve_position(pos: &PosValue, meter_map: &[MeterChange], span: Span, diagnostics: &mut Vec<Diagnostic>) -> Rat {
    match pos {
        PosValue::Exact(r) => *r,
        PosValue::Ref { bar, beat } => {
            let bar_start = bar_start_offset(*bar, meter_map);
            let (numerator, denominator) = active_meter_at(meter_map, bar_start);
            if *beat > numerator {
                diagnostics.push(Diagnostic::error(
                    DiagnosticCode::BeatOutOfRange,
                    format!("beat {beat} exceeds meter numerator {numerator} at bar {bar}"),
                    span,
                ));
            }
            let beat_len = Rat::make(1, denominator).unwrap_or(Rat::ONE);
            let result = bar_start.add(beat_len.mul(Rat::from_int(*beat - 1)));
            if result.is_negative() {
                diagnostics.push(Diagnostic::error(DiagnosticCode::BeatOutOfRange, "resolved position is negative", span));
            }
            result
        }
        PosValue::Offset { base, offset } => {
            let base_resolved = resolve_position(base, meter_map, span, diagnostics);
            base_resolved.add(*offset)
        }
    }
}

fn bar_start_offset(bar: i64, meter_map: &[MeterChange]) -> Rat {
    let mut cumulative = Rat::ZERO;
    let mut current_bar = 1i64;
    let mut active = (4i64, 4i64);
    let mut idx = 0;
    while current_bar < bar {
        while idx < meter_map.len() && meter_map[idx].at.compare(&cumulative) != std::cmp::Ordering::Greater {
            active = (meter_map[idx].numerator, meter_map[idx].denominator);
            idx += 1;
        }
        let bar_len = Rat::make(active.0, active.1).unwrap_or(Rat::ONE);
        cumulative = cumulative.add(bar_len);
        current_bar += 1;
    }
    cumulative
}

fn resolve_clip(clip: &ClipValue, clip_at: Rat, meter_map: &[MeterChange], diagnostics: &mut Vec<Diagnostic>) -> ClipIr {
    let span = crate::diagnostics::dummy_span(crate::source::FileId(0));
    let mut events: Vec<EventIr> = clip
        .events
        .iter()
        .map(|e| {
            let start = clip_at.add(resolve_position(&e.start, meter_map, span, diagnostics));
            let dur = e.dur;
            match &e.kind {
                EventKind::Note { pitch } => {
                    if !(0..=127).contains(pitch) {
                        diagnostics.push(Diagnostic::error(
                            DiagnosticCode::PitchOutOfRange,
                            format!("pitch {pitch} is out of range"),
                            span,
                        ));
                    }
                    EventIr::Note { pitch: *pitch, start, dur }
                }
                EventKind::Chord { pitches } => EventIr::Chord { pitches: pitches.clone(), start, dur },
                EventKind::Hit { sound } => EventIr::Hit { sound: sound.clone(), start, dur },
                EventKind::Rest => EventIr::Rest { start, dur },
                EventKind::Cc { controller, value } => EventIr::Cc { controller: *controller, value: *value, start },
                EventKind::Automation { param, value } => {
                    EventIr::Automation { param: param.clone(), value: *value, start, dur }
                }
                EventKind::Marker { kind, label } => EventIr::Marker { kind: kind.clone(), label: label.clone(), start },
            }
        })
        .collect();
    events.sort_by(|a, b| a.start().compare(&b.start()));

    let length = clip.length.unwrap_or_else(|| {
        events
            .iter()
            .map(|e| match e {
                EventIr::Note { start, dur, .. }
                | EventIr::Chord { start, dur, .. }
                | EventIr::Hit { start, dur, .. }
                | EventIr::Rest { start, dur, .. }
                | EventIr::Automation { start, dur, .. } => start.add(*dur),
                EventIr::Cc { start, .. } | EventIr::Marker { start, .. } => *start,
            })
            .fold(Rat::ZERO, |acc, end| if end.compare(&acc) == std::cmp::Ordering::Greater { end } else { acc })
    });

    ClipIr { events, length }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::dummy_span;
    use crate::source::FileId;
    use crate::value::{MetaValue, TempoEntryValue};

    fn empty_score() -> ScoreValue {
        ScoreValue {
            meta: MetaValue::default(),
            tempo: vec![TempoEntryValue { pos: PosValue::Exact(Rat::ZERO), bpm: 140.0 }],
            meter: Vec::new(),
            sounds: Vec::new(),
            tracks: Vec::new(),
            markers: Vec::new(),
        }
    }

    #[test]
    fn missing_meter_map_is_synthesized_as_4_4_at_zero() {
        let mut diagnostics = Vec::new();
        let ir = normalize(&empty_score(), "test", "hash", dummy_span(FileId(0)), &mut diagnostics);
        assert_eq!(ir.meter_map.len(), 1);
        assert_eq!(ir.meter_map[0].numerator, 4);
        assert_eq!(ir.meter_map[0].denominator, 4);
        assert!(ir.meter_map[0].at.is_zero());
        assert!(diagnostics.iter().any(|d| d.severity == crate::diagnostics::Severity::Warning));
    }

    #[test]
    fn bar_2_beat_1_in_4_4_resolves_to_one_whole_note() {
        let pos = PosValue::Ref { bar: 2, beat: 1 };
        let meter_map = vec![MeterChange { at: Rat::ZERO, numerator: 4, denominator: 4 }];
        let mut diagnostics = Vec::new();
        let span = dummy_span(FileId(0));
        let r = resolve_position(&pos, &meter_map, span, &mut diagnostics);
        assert_eq!(r, Rat::ONE);
    }

    #[test]
    fn beat_beyond_numerator_is_reported() {
        let pos = PosValue::Ref { bar: 1, beat: 9 };
        let meter_map = vec![MeterChange { at: Rat::ZERO, numerator: 4, denominator: 4 }];
        let mut diagnostics = Vec::new();
        let span = dummy_span(FileId(0));
        resolve_position(&pos, &meter_map, span, &mut diagnostics);
        assert!(diagnostics.iter().any(|d| d.code == DiagnosticCode::BeatOutOfRange));
    }

    #[test]
    fn ir_version_is_4() {
        let mut diagnostics = Vec::new();
        let ir = normalize(&empty_score(), "test", "hash", dummy_span(FileId(0)), &mut diagnostics);
        assert_eq!(ir.tako.ir_version, 4);
    }
}
