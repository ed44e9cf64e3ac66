//! Integration tests for the Tako core compiler.
//!
//! Exercises the full pipeline (`check`/`compile`) end-to-end through the
//! scenarios and boundary behaviors named in the specification.

use tako_core::diagnostics::{DiagnosticCode, Severity};
use tako_core::{check, compile};

fn rat_eq(r: tako_core::Rat, n: i64, d: i64) {
    assert_eq!(r, tako_core::Rat::make(n, d).unwrap());
}

#[test]
fn s1_minimal_score_produces_expected_ir() {
    let source = r#"
        export fn main() -> Score {
          return score {
            tempo { 1:1 -> 120bpm; }
            meter { 1:1 -> 4/4; }
            sound "s" kind instrument { label "S"; }
            track "T" role Instrument sound "s" {
              place 1:1 clip { note(C4, 1/4); };
            }
          };
        }
    "#;
    let result = compile(source, "s1.mfs");
    assert!(result.success, "diagnostics: {:?}", result.diagnostics);
    let ir = result.ir.expect("ir present on success");

    assert_eq!(ir.tempo_map.len(), 1);
    rat_eq(ir.tempo_map[0].at, 0, 1);
    assert_eq!(ir.tempo_map[0].bpm, 120.0);

    assert_eq!(ir.meter_map.len(), 1);
    rat_eq(ir.meter_map[0].at, 0, 1);
    assert_eq!(ir.meter_map[0].numerator, 4);
    assert_eq!(ir.meter_map[0].denominator, 4);

    assert_eq!(ir.tracks.len(), 1);
    let track = &ir.tracks[0];
    assert_eq!(track.placements.len(), 1);
    rat_eq(track.placements[0].at, 0, 1);
    assert_eq!(track.placements[0].clip.events.len(), 1);
    match &track.placements[0].clip.events[0] {
        tako_core::ir::EventIr::Note { pitch, start, dur } => {
            assert_eq!(*pitch, 60);
            rat_eq(*start, 0, 1);
            rat_eq(*dur, 1, 4);
        }
        other => panic!("expected a note event, got {other:?}"),
    }
    assert!(!result.diagnostics.iter().any(|d| d.is_error()));
}

#[test]
fn s2_bar_offset_resolves_via_meter_map() {
    let source = r#"
        export fn main() -> Score {
          return score {
            tempo { 1:1 -> 120bpm; }
            meter { 1:1 -> 4/4; }
            sound "s" kind instrument { }
            track "T" role Instrument sound "s" {
              place 2:1 clip { note(D4, 1/4); };
            }
          };
        }
    "#;
    let result = compile(source, "s2.mfs");
    assert!(result.success, "diagnostics: {:?}", result.diagnostics);
    let ir = result.ir.unwrap();
    rat_eq(ir.tracks[0].placements[0].at, 1, 1);
}

#[test]
fn s3_meter_change_mid_score() {
    let source = r#"
        export fn main() -> Score {
          return score {
            tempo { 1:1 -> 120bpm; }
            meter { 1:1 -> 4/4; 3:1 -> 3/4; }
            sound "s" kind instrument { }
            track "T" role Instrument sound "s" {
              place 4:1 clip { note(C4, 1/4); };
              place 3:2 clip { note(C4, 1/4); };
            }
          };
        }
    "#;
    let result = compile(source, "s3.mfs");
    assert!(result.success, "diagnostics: {:?}", result.diagnostics);
    let ir = result.ir.unwrap();
    rat_eq(ir.tracks[0].placements[0].at, 11, 4);
    rat_eq(ir.tracks[0].placements[1].at, 9, 4);
}

#[test]
fn s4_circular_import_is_reported() {
    // `compile` only evaluates the entry module's own declarations; the
    // cycle-detection path lives in the module loader and is exercised here
    // the way an `import` statement would drive it.
    use tako_core::module::Loader;
    use tako_core::source::SourceMap;

    let mut sources = SourceMap::new();
    let file_a = sources.add_file("a.mfs", "import { x } from \"b.mfs\";\nexport const main = 1;\n");
    sources.add_file("b.mfs", "import { main } from \"a.mfs\";\nexport const x = 1;\n");
    let mut loader = Loader::new(&mut sources);
    let mut diagnostics = Vec::new();
    let span = tako_core::diagnostics::dummy_span(file_a);
    let _ = loader.load("a.mfs", span, &mut diagnostics);
    assert_eq!(diagnostics.iter().filter(|d| d.code == DiagnosticCode::CircularImport).count(), 1);
}

#[test]
fn s5_pitch_out_of_range_blocks_ir() {
    let source = r#"
        export fn main() -> Score {
          return score {
            tempo { 1:1 -> 120bpm; }
            meter { 1:1 -> 4/4; }
            sound "s" kind instrument { }
            track "T" role Instrument sound "s" {
              place 1:1 clip { note(C4 + 100, 1/4); };
            }
          };
        }
    "#;
    let result = compile(source, "s5.mfs");
    assert!(!result.success);
    assert!(result.ir.is_none());
    assert!(result.diagnostics.iter().any(|d| d.code == DiagnosticCode::PitchOutOfRange));
}

#[test]
fn s6_duplicate_sound_id_reports_two_spans() {
    let source = r#"
        export const main = score {
            sound "s" kind instrument { }
            sound "s" kind instrument { }
        };
    "#;
    let result = check(source, "s6.mfs");
    let dup = result.diagnostics.iter().find(|d| d.code == DiagnosticCode::DuplicateSoundId);
    assert!(dup.is_some(), "diagnostics: {:?}", result.diagnostics);
    let dup = dup.unwrap();
    assert!(!dup.related.is_empty(), "expected a related 'previously declared here' span");
}

#[test]
fn module_with_only_declarations_has_no_top_level_execution_diagnostic() {
    // `TopLevelExecutionInImport` is only raised by the module loader when a
    // module is loaded as an *import*, so this goes through `Loader::load`
    // directly rather than `check`.
    use tako_core::module::Loader;
    use tako_core::source::SourceMap;

    let mut sources = SourceMap::new();
    let file = sources.add_file(
        "lib.mfs",
        "fn helper(x) { return x + 1; }\nconst value = helper(1);\nenum Color { Red, Green, Blue }\n",
    );
    let mut loader = Loader::new(&mut sources);
    let mut diagnostics = Vec::new();
    let span = tako_core::diagnostics::dummy_span(file);
    let _ = loader.load("lib.mfs", span, &mut diagnostics);
    assert!(!diagnostics.iter().any(|d| d.code == DiagnosticCode::TopLevelExecutionInImport));
}

#[test]
fn meter_change_off_bar_boundary_is_rejected() {
    // `MeterNotAtBarStart` is raised by the normalizer, which only runs as
    // part of `compile`; `check` stops before normalization.
    let source = r#"
        export const main = score {
            tempo { 1:1 -> 120bpm; }
            meter { 1:1 -> 4/4; 2:2 -> 3/4; }
            sound "s" kind instrument { }
            track "T" role Instrument sound "s" {
                place 1:1 clip { note(C4, 1/4); };
            }
        };
    "#;
    let result = compile(source, "off_bar.mfs");
    assert!(!result.success);
    assert!(result.diagnostics.iter().any(|d| d.code == DiagnosticCode::MeterNotAtBarStart));
}

#[test]
fn pitch_boundary_c_minus_1_and_g9_are_accepted_c10_is_rejected() {
    let low = check("const p = C-1;", "low.mfs");
    assert!(!low.diagnostics.iter().any(|d| d.is_error()));
    let high = check("const p = G9;", "high.mfs");
    assert!(!high.diagnostics.iter().any(|d| d.is_error()));
    let too_high = check("const p = C10;", "toohigh.mfs");
    assert!(too_high.diagnostics.iter().any(|d| d.is_error()));
}

#[test]
fn for_loop_with_let_bounds_is_rejected_const_bounds_succeeds() {
    // `ForBoundsNotConst` is only raised once the loop statement actually
    // executes, so these go through `compile` (which evaluates `main`)
    // rather than `check`.
    let with_let = r#"
        fn sum() {
            let lo = 0;
            let hi = 3;
            let total = 0;
            for i in lo..hi {
                total = total + i;
            }
            return total;
        }
        export const main = sum();
    "#;
    let result = compile(with_let, "let_bounds.mfs");
    assert!(result.diagnostics.iter().any(|d| d.code == DiagnosticCode::ForBoundsNotConst));

    let with_const = r#"
        fn sum() {
            const lo = 0;
            const hi = 3;
            let total = 0;
            for i in lo..hi {
                total = total + i;
            }
            return total;
        }
        export const main = sum();
    "#;
    let result = compile(with_const, "const_bounds.mfs");
    assert!(!result.diagnostics.iter().any(|d| d.code == DiagnosticCode::ForBoundsNotConst));
}

#[test]
fn const_forward_reference_is_use_before_init() {
    let source = r#"
        const a = b;
        const b = 1;
    "#;
    let result = compile(source, "forward_ref.mfs");
    assert!(result.diagnostics.iter().any(|d| d.code == DiagnosticCode::UseBeforeInit));
}

#[test]
fn check_has_no_error_iff_compile_produces_ir() {
    let good = r#"
        export const main = score {
            tempo { 1:1 -> 120bpm; }
            meter { 1:1 -> 4/4; }
            sound "s" kind instrument { }
            track "T" role Instrument sound "s" {
                place 1:1 clip { note(C4, 1/4); };
            }
        };
    "#;
    let check_result = check(good, "roundtrip.mfs");
    let compile_result = compile(good, "roundtrip.mfs");
    assert_eq!(!check_result.diagnostics.iter().any(|d| d.is_error()), compile_result.ir.is_some());
    assert!(compile_result.success);

    let bad = r#"const main = 1 +;"#;
    let check_result = check(bad, "roundtrip_bad.mfs");
    let compile_result = compile(bad, "roundtrip_bad.mfs");
    assert_eq!(!check_result.diagnostics.iter().any(|d| d.is_error()), compile_result.ir.is_some());
    assert!(!compile_result.success);
}

#[test]
fn formatter_is_idempotent_on_a_canonically_formatted_source() {
    use tako_core::format_source;
    use tako_core::source::FileId;

    let source = "const a = 1;\nfn f(a, b = 3) {\n  return a + b;\n}\n";
    let (once, _) = format_source(source, FileId(0));
    let (twice, _) = format_source(&once, FileId(0));
    assert_eq!(once, twice, "formatting must be idempotent on its own output");
}

#[test]
fn severity_ordering_places_errors_above_warnings() {
    assert!(Severity::Error < Severity::Warning);
}
