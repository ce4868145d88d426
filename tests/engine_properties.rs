// tests/engine_properties.rs
mod common;

use common::*;
use glam::{DAffine3, DVec3};
use proptest::prelude::*;
use robot_post::dispatch::emit_scope;
use robot_post::frame::transform_from_xyzwpr;
use robot_post::{
    ConditionalScope, Dialect, DialectKind, Emitter, Frame, FrameResolver, IfStatement, Krl,
    Motion, NameAllocator, Node, PostConfig, Rapid, Statement, StatementKind, SwitchStatement,
    UrScript, Value, Variable, WhileStatement, post_process, translate,
};
use std::collections::HashSet;

// =============================================================================
// Names
// =============================================================================

#[test]
fn test_position_name_collisions() {
    let mut names = NameAllocator::default();
    assert_eq!(names.allocate("P1").unwrap(), "P1");
    assert_eq!(names.allocate("P1").unwrap(), "P10");
    assert_eq!(names.allocate("P1").unwrap(), "P11");
    assert_eq!(names.allocate("Move_3").unwrap(), "Move_3");
    assert_eq!(names.allocate("Move_3").unwrap(), "Move_1");
}

#[test]
fn test_reserved_names_are_never_produced() {
    let mut names = NameAllocator::default();
    names.reserve("Main");
    assert_eq!(names.allocate("Main").unwrap(), "Main0");
}

#[test]
fn test_attempt_limit_is_a_hard_failure() {
    let mut names = NameAllocator::new(2);
    names.allocate("P").unwrap();
    names.allocate("P").unwrap();
    names.allocate("P").unwrap();
    assert!(names.allocate("P").is_err());
}

proptest! {
    #[test]
    fn allocated_names_are_unique(
        seeds in prop::collection::vec("[A-Za-z]{1,3}(_?[0-9]{0,2})", 1..60),
    ) {
        let mut names = NameAllocator::default();
        let mut seen = HashSet::new();
        for seed in &seeds {
            let name = names.allocate(seed).unwrap();
            if !seed.contains('_') {
                prop_assert!(name.starts_with(seed.as_str()));
            }
            prop_assert!(seen.insert(name));
        }
    }
}

// =============================================================================
// Indentation
// =============================================================================

fn leaf() -> impl Strategy<Value = Statement> {
    prop_oneof![
        "[a-z]{1,8}".prop_map(|text| comment(&text)),
        Just(Statement::new("Halt", StatementKind::Halt)),
        Just(Statement::new("Brk", StatementKind::Break)),
        Just(Statement::new("Cont", StatementKind::Continue)),
        (0.0f64..5.0).prop_map(|seconds| Statement::new("Delay", StatementKind::Delay { seconds })),
        "[a-z]{1,8}".prop_map(|message| Statement::new("Print", StatementKind::Print { message })),
        (0u32..16, any::<bool>()).prop_map(|(port, value)| {
            Statement::new("Out", StatementKind::SetDigitalOutput { port, value })
        }),
        (0.0f64..500.0).prop_map(|x| linear("Move", "P1", x, 500.0, 200.0)),
    ]
}

fn tree() -> impl Strategy<Value = Vec<Statement>> {
    let statement = leaf().prop_recursive(4, 48, 6, |inner| {
        let scope = prop::collection::vec(inner, 0..4);
        prop_oneof![
            (scope.clone(), prop::collection::vec(scope.clone(), 0..3), scope.clone()).prop_map(
                |(then_scope, else_ifs, else_scope)| {
                    Statement::new(
                        "If",
                        StatementKind::If(IfStatement {
                            condition: "x".into(),
                            then_scope,
                            else_ifs: else_ifs
                                .into_iter()
                                .map(|scope| ConditionalScope::new("y", scope))
                                .collect(),
                            else_scope,
                        }),
                    )
                }
            ),
            scope.clone().prop_map(|scope| {
                Statement::new(
                    "While",
                    StatementKind::While(WhileStatement {
                        condition: "x".into(),
                        scope,
                    }),
                )
            }),
            prop::collection::vec(scope, 0..3).prop_map(|cases| {
                Statement::new(
                    "Switch",
                    StatementKind::SwitchCase(SwitchStatement {
                        condition: "x".into(),
                        cases: cases
                            .into_iter()
                            .enumerate()
                            .map(|(i, scope)| ConditionalScope::new(i.to_string(), scope))
                            .collect(),
                    }),
                )
            }),
        ]
    });
    prop::collection::vec(statement, 0..6)
}

/// Emits `scope` into a fresh unit and returns the depth afterwards.
fn depth_after<D: Dialect>(dialect: &mut D, scope: &[Statement]) -> usize {
    let program = program(Vec::new());
    let cell = cell();
    let config = PostConfig::default();
    let layout = dialect.layout();
    let mut em = Emitter::new(&program, &cell, &config, "Main", &layout);
    em.begin_routine(&program.main);
    let _ = emit_scope(dialect, &mut em, scope);
    em.state.depth()
}

proptest! {
    #[test]
    fn indentation_returns_to_zero(scope in tree()) {
        let config = PostConfig::default();
        prop_assert_eq!(depth_after(&mut Krl::new(&config), &scope), 0);
        prop_assert_eq!(depth_after(&mut Rapid::new(&config), &scope), 0);
        prop_assert_eq!(depth_after(&mut UrScript::new(&config), &scope), 0);
    }
}

#[test]
fn test_indentation_recovers_from_nested_failure() {
    let failing = linear_with(
        "Bad",
        Motion {
            base: Some("Part".into()),
            tool: Some("Gripper".into()),
            ..Motion::new("P1", DAffine3::IDENTITY)
        },
    );
    let nested = Statement::new(
        "Loop",
        StatementKind::While(WhileStatement {
            condition: "TRUE".into(),
            scope: vec![Statement::new(
                "If",
                StatementKind::If(IfStatement {
                    condition: "x".into(),
                    then_scope: vec![failing],
                    ..Default::default()
                }),
            )],
        }),
    );

    let program = program(Vec::new());
    let cell = cell();
    let config = PostConfig::default();
    let mut rapid = Rapid::new(&config);
    let layout = rapid.layout();
    let mut em = Emitter::new(&program, &cell, &config, "Main", &layout);
    assert!(emit_scope(&mut rapid, &mut em, &[nested]).is_err());
    assert_eq!(em.state.depth(), 0);
}

// =============================================================================
// Frames
// =============================================================================

#[test]
fn test_detached_frames_resolve_to_their_stored_transform() {
    let cell = cell();
    let robot = robot();
    let resolver = FrameResolver::new(&cell, &robot);
    let stored = transform_from_xyzwpr(10.0, 20.0, 30.0, 0.0, 45.0, 0.0);

    let base = resolver.resolve_base(&Frame::new("Fixed", stored)).unwrap();
    let tool = resolver.resolve_tool(&Frame::new("Fixed", stored)).unwrap();
    assert_eq!(base.transform, stored);
    assert_eq!(tool.transform, stored);
}

#[test]
fn test_external_tcp_base_is_relative_to_flange() {
    let mut cell = cell();
    let flange_world = cell.node(FLANGE).unwrap().world;
    let holder_world = flange_world * transform_from_xyzwpr(0.0, 50.0, 120.0, 0.0, 0.0, 30.0);
    cell.add_node(10, Node::new("Holder", Some(FLANGE), holder_world));
    let local = transform_from_xyzwpr(5.0, 0.0, 15.0, 90.0, 0.0, 0.0);
    let part = Frame::attached("Workpiece", 10, local);

    let robot = robot();
    let resolver = FrameResolver::new(&cell, &robot);
    let resolved = resolver.resolve_base(&part).unwrap();
    let expected = flange_world.inverse() * holder_world * local;

    assert!(resolved.transform.abs_diff_eq(expected, 1e-6));

    // The holder offset carries straight through into flange space.
    let origin = resolved.transform.transform_point3(DVec3::ZERO);
    assert!((origin.z - 135.0).abs() < 1e-6);
}

// =============================================================================
// Files
// =============================================================================

#[test]
fn test_write_failure_reports_io_error() {
    let blocker = out_dir("io").join("not-a-dir");
    std::fs::write(&blocker, "").unwrap();
    let target = blocker.join("Main.src");

    let program = program(vec![comment("x")]);
    let result = post_process(
        DialectKind::Krl,
        &cell(),
        &program,
        &target,
        &PostConfig::default(),
    );
    assert!(!result.success);
    assert!(result.files.is_empty());
    assert!(result.diagnostics.iter().any(|d| d.message.contains("failed to write")));
}

#[test]
fn test_files_written_before_a_failure_are_reported() {
    let dir = out_dir("partial");
    // The data list is written first; the program file cannot be.
    std::fs::create_dir(dir.join("Main.src")).unwrap();
    let target = dir.join("Main.src");

    let program = program(vec![linear("Move1", "P1", 100.0, 500.0, 200.0)]);
    let result = post_process(
        DialectKind::Krl,
        &cell(),
        &program,
        &target,
        &PostConfig::default(),
    );
    assert!(!result.success);
    assert_eq!(result.files, [dir.join("Main.dat")]);
    assert!(read(&dir.join("Main.dat")).contains("DECL E6POS XP1="));
    assert!(
        result
            .diagnostics
            .iter()
            .any(|d| d.message.contains("failed to write") && d.message.contains("Main.src"))
    );
}

// =============================================================================
// Dialect reuse
// =============================================================================

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
fn test_reused_rapid_starts_without_signals() {
    let config = PostConfig::default();
    let mut rapid = Rapid::new(&config);
    let dir = out_dir("rapid-reuse");

    let with_io = program(vec![Statement::new(
        "Out",
        StatementKind::SetDigitalOutput { port: 7, value: true },
    )]);
    let first = translate(&mut rapid, &cell(), &with_io, &dir.join("A.mod"), &config);
    assert!(first.success);
    assert_eq!(first.files.len(), 2);
    std::fs::remove_file(dir.join("EIO.cfg")).unwrap();

    let quiet = program(vec![comment("no signals")]);
    let second = translate(&mut rapid, &cell(), &quiet, &dir.join("B.mod"), &config);
    assert!(second.success);
    assert_eq!(second.files, [dir.join("B.mod")]);
    assert!(!dir.join("EIO.cfg").exists());
}

#[test]
fn test_reused_krl_declares_variables_again() {
    let config = PostConfig::default();
    let mut krl = Krl::new(&config);
    let dir = out_dir("krl-reuse");

    let counting = || {
        let mut program = program(vec![assign("count", "count + 1")]);
        program.main.variables.push(Variable::new("count", Value::Int(0)));
        program
    };
    for unit in ["A", "B"] {
        let target = dir.join(format!("{unit}.src"));
        let result = translate(&mut krl, &cell(), &counting(), &target, &config);
        assert!(result.success, "{unit}: {:?}", result.diagnostics);
        let dat = read(&target.with_extension("dat"));
        assert!(dat.contains("  DECL INT count\n"), "{unit}: {dat}");
    }
}

#[test]
fn test_reused_krl_maps_frames_from_scratch() {
    let config = PostConfig::default();
    let mut krl = Krl::new(&config);
    let dir = out_dir("krl-reuse-slots");
    let with_tool = |tool: &str| {
        linear_with(
            "Move1",
            Motion {
                tool: Some(tool.into()),
                ..Motion::new("P1", DAffine3::IDENTITY)
            },
        )
    };

    let first = program(vec![with_tool("Gripper")]);
    assert!(translate(&mut krl, &cell(), &first, &dir.join("A.src"), &config).success);
    assert_eq!(krl.tool_slots().get("Gripper"), Some(1));

    let mut second = program(vec![with_tool("Torch")]);
    second
        .robot
        .tools
        .push(Frame::attached("Torch", FLANGE, DAffine3::IDENTITY));
    assert!(translate(&mut krl, &cell(), &second, &dir.join("B.src"), &config).success);
    assert_eq!(krl.tool_slots().get("Torch"), Some(1));
    assert_eq!(krl.tool_slots().get("Gripper"), None);
}

#[test]
fn test_reused_urscript_writes_main_into_the_body() {
    let config = PostConfig::default();
    let mut ur = UrScript::new(&config);
    let dir = out_dir("ur-reuse");

    let mut with_sub = program(vec![comment("main")]);
    let mut sub = robot_post::Routine::new("Pick");
    sub.push(comment("pick"));
    with_sub.add_routine(sub);
    assert!(translate(&mut ur, &cell(), &with_sub, &dir.join("A.script"), &config).success);

    let plain = program(vec![comment("only main")]);
    assert!(translate(&mut ur, &cell(), &plain, &dir.join("B.script"), &config).success);
    insta::assert_snapshot!(read(&dir.join("B.script")), @r"
    def B():
      # only main
    end #B

    B()
    ");
}
