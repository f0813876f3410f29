// tests/registry_tests.rs
mod common;

use common::*;
use pipeflow::stages::ValuesSource;
use pipeflow::{compile, PipeError, Registry, StageDefinition};
use serde_json::json;
use serial_test::serial;

const BUILTIN: &[&str] = &[
  "decode",
  "encode",
  "exec",
  "flatten",
  "json.decode",
  "json.encode",
  "limit",
  "render",
  "skip",
  "temp",
];

#[test]
fn test_builtin_registry_holds_every_stage() {
  let registry = Registry::builtin();
  for name in BUILTIN {
    assert!(registry.contains(name), "missing builtin stage {}", name);
  }
  let sorted: Vec<_> = registry.sorted().into_iter().map(|d| d.name).collect();
  assert_eq!(sorted, BUILTIN);
}

#[test]
fn test_new_registry_is_empty_with_exec_fallback() {
  let registry = Registry::new();
  assert!(registry.is_empty());
  assert_eq!(registry.fallback().name, "exec");
  assert!(registry.get("exec").is_none());
}

#[test]
fn test_alias_resolves_to_target() {
  let registry = Registry::builtin();
  let alias = registry.get("decode").unwrap();
  assert_eq!(alias.description, "Alias for `json.decode`.");

  let stage = compile("decode", &registry).unwrap();
  assert_eq!(stage[0].stage.name(), "json.decode");
}

#[test]
fn test_alias_of_unknown_stage_fails() {
  let registry = Registry::new();
  match registry.alias("x", "nope") {
    Err(PipeError::UnknownStage { name }) => assert_eq!(name, "nope"),
    other => panic!("Expected PipeError::UnknownStage, got {:?}", other),
  }
}

#[test]
fn test_help_text() {
  let registry = Registry::builtin();
  assert_eq!(registry.help("skip").unwrap(), "skip\n\tskip N\n\tDrops the first N values.");
  assert!(matches!(registry.help("missing"), Err(PipeError::UnknownStage { .. })));
}

#[test]
fn test_define_replaces_existing_definition() {
  let registry = Registry::builtin();
  registry.define(StageDefinition::new("limit", "always one value", |_args| {
    Ok(ValuesSource::new([json!("replaced")]))
  }));
  assert_eq!(registry.get("limit").unwrap().description, "always one value");
  assert_eq!(registry.len(), BUILTIN.len());
}

#[tokio::test]
#[serial]
async fn test_custom_stage_is_usable_from_scripts() {
  setup_tracing();
  let registry = Registry::new();
  registry.define(StageDefinition::new("numbers", "numbers N", |args| {
    let n = args.int(0, "count")?;
    Ok(ValuesSource::new((0..n).map(|i| json!(i))))
  }));

  let modules = compile("numbers 3", &registry).unwrap();
  let (result, collected) = run_collect(modules).await;
  assert!(result.is_ok());
  assert_eq!(collected, vec![json!(0), json!(1), json!(2)]);
}

#[test]
fn test_unknown_names_fall_back_to_exec() {
  let registry = Registry::builtin();
  let modules = compile("grep -v foo :: wc -l", &registry).unwrap();
  let names: Vec<_> = modules.iter().map(|m| m.stage.name().to_string()).collect();
  assert_eq!(names, vec!["grep", "wc"]);
}

#[test]
fn test_fork_groups_compile_to_fork_stages() {
  let registry = Registry::builtin();
  let modules = compile("json.decode as doc :: ((flatten :: limit 1)) :: json.encode", &registry).unwrap();
  assert_eq!(modules.len(), 3);
  assert_eq!(modules[0].tag.as_ref().map(|t| t.as_str()), Some("doc"));
  assert_eq!(modules[1].stage.name(), "fork");
  assert!(modules[1].tag.is_none());
}

#[test]
fn test_resolution_errors_carry_position_and_name() {
  let registry = Registry::builtin();
  match compile("flatten :: limit abc", &registry) {
    Err(PipeError::Resolution {
      position, name, args, ..
    }) => {
      assert_eq!(position, 1);
      assert_eq!(name, "limit");
      assert_eq!(args, "abc");
    }
    other => panic!("Expected PipeError::Resolution, got {:?}", other.map(|m| m.len())),
  }

  assert!(matches!(
    compile("limit", &registry),
    Err(PipeError::Resolution { position: 0, .. })
  ));
  assert!(matches!(
    compile(r#"render "unterminated"#, &registry),
    Err(PipeError::Resolution { .. })
  ));
  assert!(matches!(
    compile("render {{ self", &registry),
    Err(PipeError::Resolution { .. })
  ));
}

#[test]
fn test_parse_errors_come_before_resolution() {
  let registry = Registry::builtin();
  assert!(matches!(compile("limit abc :: ::", &registry), Err(PipeError::Parse(_))));
  assert!(matches!(compile("", &registry), Err(PipeError::Parse(_))));
}
