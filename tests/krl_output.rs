// tests/krl_output.rs
mod common;

use common::*;
use glam::{DAffine3, DVec3};
use robot_post::{
    Accuracy, ConditionalScope, DialectKind, IfStatement, Motion, PostConfig, Program, Routine,
    Severity, Statement, StatementKind, SwitchStatement, Translation, Value, Variable,
    post_process,
};
use std::path::PathBuf;

fn translate(program: &Program, tag: &str) -> (Translation, PathBuf) {
    translate_with(program, tag, &PostConfig::default())
}

fn translate_with(program: &Program, tag: &str, config: &PostConfig) -> (Translation, PathBuf) {
    let target = out_dir(tag).join("Main.src");
    let result = post_process(DialectKind::Krl, &cell(), program, &target, config);
    (result, target)
}

fn inline_config() -> PostConfig {
    let mut config = PostConfig::default();
    config.krl.inline_form = true;
    config
}

#[test]
fn test_single_linear_motion() {
    let program = program(vec![linear("Move1", "P1", 100.0, 500.0, 200.0)]);
    let (result, target) = translate(&program, "krl-linear");

    assert!(result.success, "{:?}", result.diagnostics);
    assert_eq!(
        result.files,
        [target.with_extension("dat"), target.with_extension("src")]
    );

    insta::assert_snapshot!(read(&target), @r"
    DEF Main()
      GLOBAL INTERRUPT DECL 3 WHEN $STOPMESS==TRUE DO IR_STOPM()
      INTERRUPT ON 3
      BAS (#INITMOV,0 )

      ;COMMANDS
      $BWDSTART=FALSE
      $TOOL=$NULLFRAME
      $LOAD.M=$DEF_L_M
      $LOAD.CM=$DEF_L_CM
      $LOAD.J=$DEF_L_J
      $BASE=$WORLD
      $IPO_MODE=#BASE
      $VEL.CP=0.20
      LIN XP1
    END
    ");

    let dat = read(&target.with_extension("dat"));
    assert_eq!(
        dat,
        "DEFDAT Main\n  DECL E6POS XP1={X 100.000,Y 0.000,Z 500.000,A 0.0000,B 0.0000,\
         C 0.0000,S 2,T 0,E1 0,E2 0,E3 0,E4 0,E5 0,E6 0}\nENDDAT\n"
    );
}

#[test]
fn test_modes_are_written_only_when_they_change() {
    let program = program(vec![
        linear("Move1", "P1", 100.0, 500.0, 200.0),
        linear("Move2", "P1", 200.0, 500.0, 200.0),
        linear("Move3", "P1", 300.0, 500.0, 500.0),
    ]);
    let (result, target) = translate(&program, "krl-modes");
    assert!(result.success);

    let src = read(&target);
    assert_eq!(src.matches("$TOOL=$NULLFRAME").count(), 1);
    assert_eq!(src.matches("$BASE=$WORLD").count(), 1);
    assert_eq!(src.matches("$VEL.CP=0.20").count(), 1);
    assert_eq!(src.matches("$VEL.CP=0.50").count(), 1);
    assert_eq!(src.matches("$BWDSTART=FALSE").count(), 1);
    // Colliding position names are renamed.
    assert!(src.contains("LIN XP1\n"));
    assert!(src.contains("LIN XP10\n"));
    assert!(src.contains("LIN XP11\n"));
}

#[test]
fn test_named_frames_take_free_slots() {
    let motion = Motion {
        base: Some("Table".into()),
        tool: Some("Gripper".into()),
        ..Motion::new("P1", DAffine3::from_translation(DVec3::X * 10.0))
    };
    let program = program(vec![linear_with("Move1", motion)]);
    let (result, target) = translate(&program, "krl-slots");
    assert!(result.success, "{:?}", result.diagnostics);

    let src = read(&target);
    assert!(src.contains(
        "  BASE_DATA[1]={X 0.000,Y 1500.000,Z 0.000,A 0.0000,B 0.0000,C 0.0000}\n"
    ));
    assert!(src.contains(
        "  TOOL_DATA[1]={X 0.000,Y 0.000,Z 150.000,A 0.0000,B 0.0000,C 0.0000}\n"
    ));
    assert!(src.contains("$TOOL=TOOL_DATA[1]\n  $LOAD=LOAD_DATA[1]\n"));
    assert!(src.contains("$BASE=BASE_DATA[1]\n"));
    assert!(src.contains("$IPO_MODE=#BASE\n"));
}

#[test]
fn test_external_tcp_swaps_registers_and_inverts_target() {
    let motion = Motion {
        base: Some("Part".into()),
        tool: Some("Spindle".into()),
        ..Motion::new("P1", DAffine3::from_translation(DVec3::X * 100.0))
    };
    let program = program(vec![linear_with("Move1", motion)]);
    let (result, target) = translate(&program, "krl-ext-tcp");
    assert!(result.success, "{:?}", result.diagnostics);

    let src = read(&target);
    // The stationary spindle lives in the base register, the carried part in the tool register.
    assert!(src.contains("BASE_DATA[1]={X 0.000,Y 1500.000,Z 0.000,A 0.0000,B 0.0000,C 0.0000}"));
    assert!(src.contains("TOOL_DATA[1]={X 0.000,Y 0.000,Z 0.000,A 0.0000,B 0.0000,C 0.0000}"));
    assert!(src.contains("$IPO_MODE=#TCP\n"));

    let dat = read(&target.with_extension("dat"));
    assert!(dat.contains("DECL E6POS XP1={X -100.000,Y 0.000,Z 0.000,"));
}

#[test]
fn test_unsupported_frame_roles_fail_the_unit() {
    let motion = Motion {
        base: Some("Part".into()),
        tool: Some("Gripper".into()),
        ..Motion::new("P1", DAffine3::IDENTITY)
    };
    let program = program(vec![linear_with("Move1", motion)]);
    let (result, _) = translate(&program, "krl-unsupported");

    assert!(!result.success);
    assert!(result.files.is_empty());
    assert!(
        result
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error && d.message.contains("Move1"))
    );
}

#[test]
fn test_else_if_is_lowered_to_nested_if() {
    let branch = Statement::new(
        "If1",
        StatementKind::If(IfStatement {
            condition: "IN[3] && !OUT[2]".into(),
            then_scope: vec![Statement::new("Halt", StatementKind::Halt)],
            else_ifs: vec![ConditionalScope::new("x > 1", vec![comment("a")])],
            else_scope: vec![comment("b")],
        }),
    );
    let program = program(vec![branch]);
    let (result, target) = translate(&program, "krl-if");
    assert!(result.success);
    assert!(result.diagnostics.iter().any(|d| d.severity == Severity::Info));

    let src = read(&target);
    let expected = "\
  IF $IN[3] AND NOT $OUT[2] THEN
    HALT
  ELSE
    IF x > 1 THEN
      ;a
    ELSE
      ;b
    ENDIF
  ENDIF
";
    assert!(src.contains(expected), "{src}");
}

#[test]
fn test_switch_and_io() {
    let switch = Statement::new(
        "Switch1",
        StatementKind::SwitchCase(SwitchStatement {
            condition: "mode".into(),
            cases: vec![
                ConditionalScope::new(
                    "1",
                    vec![Statement::new(
                        "Out",
                        StatementKind::SetDigitalOutput { port: 4, value: true },
                    )],
                ),
                ConditionalScope::new(
                    "Default",
                    vec![Statement::new(
                        "Wait",
                        StatementKind::WaitDigitalInput { port: 2, value: false },
                    )],
                ),
            ],
        }),
    );
    let program = program(vec![switch]);
    let (result, target) = translate(&program, "krl-switch");
    assert!(result.success);

    let src = read(&target);
    let expected = "\
  SWITCH mode
    CASE 1
      $OUT[4]=TRUE
    DEFAULT
      WAIT FOR (NOT $IN[2])
  ENDSWITCH
";
    assert!(src.contains(expected), "{src}");
}

#[test]
fn test_unsupported_statement_is_skipped_with_one_warning() {
    let program = program(vec![
        Statement::new(
            "Print1",
            StatementKind::Print {
                message: "hello".into(),
            },
        ),
        Statement::new("Halt", StatementKind::Halt),
    ]);
    let (result, target) = translate(&program, "krl-skip");

    assert!(result.success);
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].severity, Severity::Warning);
    assert!(result.diagnostics[0].message.contains("Print1"));

    let src = read(&target);
    assert!(!src.contains("hello"));
    assert!(src.contains("  HALT\n"));
}

#[test]
fn test_subroutines_follow_main() {
    let mut program = program(vec![Statement::new(
        "Call",
        StatementKind::Call {
            routine: "Pick".into(),
        },
    )]);
    let mut pick = Routine::new("Pick");
    pick.push(Statement::new("Delay", StatementKind::Delay { seconds: 0.5 }));
    program.add_routine(pick);

    let (result, target) = translate(&program, "krl-sub");
    assert!(result.success);
    let src = read(&target);
    assert!(src.contains("  Pick()\nEND\n\nDEF Pick()\n"));
    assert!(src.contains("  WAIT SEC 0.5\nEND\n"));
}

#[test]
fn test_unknown_callee_fails_validation() {
    let program = program(vec![Statement::new(
        "Call",
        StatementKind::Call {
            routine: "Missing".into(),
        },
    )]);
    let (result, _) = translate(&program, "krl-missing");
    assert!(!result.success);
    assert!(result.diagnostics[0].message.contains("Missing"));
}

fn assign(target: &str, expression: &str) -> Statement {
    Statement::new(
        "Set",
        StatementKind::SetProperty {
            target: target.into(),
            expression: expression.into(),
        },
    )
}

#[test]
fn test_assigned_variables_are_declared_once() {
    let mut program = program(vec![assign("count", "0"), assign("count", "count + 1")]);
    program.main.variables.push(Variable::new("count", Value::Int(0)));
    program.globals.push(Variable::new("ready", Value::Bool(false)));
    program.main.push(assign("ready", "TRUE"));

    let (result, target) = translate(&program, "krl-decl");
    assert!(result.success);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);

    let dat = read(&target.with_extension("dat"));
    assert_eq!(dat.matches("DECL INT count").count(), 1);
    assert!(dat.contains("  DECL BOOL ready\n"));
}

#[test]
fn test_locals_with_clashing_types_are_reported() {
    let mut program = program(vec![
        assign("x", "1"),
        Statement::new(
            "Call",
            StatementKind::Call {
                routine: "Sub".into(),
            },
        ),
    ]);
    program.main.variables.push(Variable::new("x", Value::Int(0)));
    let mut sub = Routine::new("Sub");
    sub.variables.push(Variable::new("x", Value::Real(0.5)));
    sub.push(assign("x", "2.5"));
    program.add_routine(sub);

    let (result, target) = translate(&program, "krl-decl-clash");
    assert!(result.success);

    let dat = read(&target.with_extension("dat"));
    assert!(dat.contains("  DECL INT x\n"));
    assert!(!dat.contains("DECL REAL x"));
    let warnings: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Warning)
        .collect();
    assert_eq!(warnings.len(), 1, "{:?}", result.diagnostics);
    assert!(warnings[0].message.contains("REAL"));
    assert!(warnings[0].message.contains("Sub"));
}

#[test]
fn test_inline_form_linear_motion() {
    let program = program(vec![linear("Move1", "P1", 100.0, 500.0, 200.0)]);
    let (result, target) = translate_with(&program, "krl-inline", &inline_config());
    assert!(result.success, "{:?}", result.diagnostics);

    let expected = concat!(
        "DEF Main()\n",
        "  ;FOLD INI;%{PE}\n",
        "    ;FOLD BASISTECH INI\n",
        "      GLOBAL INTERRUPT DECL 3 WHEN $STOPMESS==TRUE DO IR_STOPM()\n",
        "      INTERRUPT ON 3\n",
        "      BAS (#INITMOV,0 )\n",
        "    ;ENDFOLD (BASISTECH INI)\n",
        "    ;FOLD USER INI\n",
        "    ;Make your modifications here\n",
        "\n",
        "    ;ENDFOLD (USER INI)\n",
        "  ;ENDFOLD (INI)\n",
        "\n",
        "  ;COMMANDS\n",
        "  ;FOLD LIN P1 Vel=0.2 m/s LP1 Tool[0] Base[0];%{PE}%R 8.3.48,%MKUKATPBASIS,",
        "%CMOVE,%VLIN,%P 1:LIN, 2:P1, 3:, 5:0.2, 7:LP1\n",
        "    $BWDSTART=FALSE\n",
        "    FDAT_ACT=FP1\n",
        "    LDAT_ACT=LP1\n",
        "    BAS(#CP_PARAMS,0.20)\n",
        "    LIN XP1\n",
        "  ;ENDFOLD\n",
        "END\n",
    );
    assert_eq!(read(&target), expected);

    let dat = read(&target.with_extension("dat"));
    assert!(dat.contains(
        "  DECL FDAT FP1={TOOL_NO 0,BASE_NO 0,IPO_FRAME #BASE,POINT2[] \" \",TQ_STATE FALSE}\n"
    ));
    assert!(dat.contains(
        "  DECL LDAT LP1={VEL 0.20000,ACC 100.000,APO_DIST 0.000,APO_FAC 50.0000,\
         AXIS_VEL 100.000,AXIS_ACC 100.000,ORI_TYP #VAR,CIRC_TYP #BASE,JERK_FAC 50.0000,\
         GEAR_JERK 50.0000,EXAX_IGN 0}\n"
    ));
}

#[test]
fn test_inline_form_spline_joint_motion() {
    let motion = Motion {
        joint_speed: 0.5,
        accuracy: Accuracy::distance(10.0),
        ..Motion::new("J1", DAffine3::IDENTITY)
    };
    let program = program(vec![Statement::new("Ptp", StatementKind::JointMotion(motion))]);
    let mut config = inline_config();
    config.krl.spline_motions = true;
    let (result, target) = translate_with(&program, "krl-inline-sptp", &config);
    assert!(result.success, "{:?}", result.diagnostics);

    let src = read(&target);
    assert!(src.contains(
        "  ;FOLD SPTP J1 CONT Vel=50 % PJ1 Tool[0] Base[0];%{PE}%R 8.3.48,%MKUKATPBASIS,\
         %CSPLINE,%VSPTP_SB,%P 1:SPTP_SB, 2:J1, 3:C_SPL, 5:50, 7:PJ1\n"
    ));
    assert!(src.contains(
        "    SPTP XJ1 WITH $VEL_AXIS[1]=SVEL_JOINT(50), $TOOL=STOOL2(FJ1), \
         $BASE=SBASE(FJ1.BASE_NO), $IPO_MODE=SIPO_MODE(FJ1.IPO_FRAME), \
         $LOAD=SLOAD(FJ1.TOOL_NO), $ACC_AXIS[1]=SACC_JOINT(PJ1), $APO=SAPO_PTP(PJ1), \
         $GEAR_JERK[1]=SGEAR_JERK(PJ1) C_SPL\n  ;ENDFOLD\n"
    ));
    assert!(!src.contains("$BWDSTART"));

    let dat = read(&target.with_extension("dat"));
    assert!(dat.contains(
        "  DECL PDAT PJ1={VEL 50.000,ACC 100.000,APO_DIST 10.000,GEAR_JERK 100.000,EXAX_IGN 0}\n"
    ));
}

#[test]
fn test_inline_form_folds_logic_statements() {
    let program = program(vec![
        comment("start"),
        Statement::new("Delay", StatementKind::Delay { seconds: 1.5 }),
        Statement::new("Out", StatementKind::SetDigitalOutput { port: 3, value: true }),
        Statement::new("Wait", StatementKind::WaitDigitalInput { port: 4, value: false }),
        Statement::new("Halt", StatementKind::Halt),
    ]);
    let (result, target) = translate_with(&program, "krl-inline-logic", &inline_config());
    assert!(result.success);

    let src = read(&target);
    let expected = "\
  ;FOLD ;start;%{PE}%R 8.3.48,%MKUKATPBASIS,%CCOMMENT,%VNORMAL,%P 2:start
  ;ENDFOLD
  ;FOLD WAIT Time=1.5 sec;%{PE}%R 8.3.48,%MKUKATPBASIS,%CWAIT,%VWAIT,%P 3:1.5
    WAIT SEC 1.5
  ;ENDFOLD
  ;FOLD OUT 3 '' State=TRUE ;%{PE}%R 8.3.48,%MKUKATPBASIS,%COUT,%VOUTX,%P 2:3, 3:, 5:TRUE, 6:
    $OUT[3]=TRUE
  ;ENDFOLD
  ;FOLD WAIT FOR (NOT IN 4 '');%{PE}%R 8.3.48,%MKUKATPBASIS,%CEXT_WAIT_FOR,\
%VEXT_WAIT_FOR,%P 2:, 4:NOT, 5:$IN, 6:4, 7:, 9:
    WAIT FOR (NOT $IN[4])
  ;ENDFOLD
  HALT
";
    assert!(src.contains(expected), "{src}");
}
