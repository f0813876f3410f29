// tests/parser_tests.rs
use pipeflow::script::{parse, Invocation};
use pipeflow::{ParseError, Tag};

fn names(invocations: &[Invocation]) -> Vec<&str> {
  invocations.iter().map(|inv| inv.name.as_str()).collect()
}

#[test]
fn test_segments_in_order() {
  let parsed = parse("a :: b :: c").unwrap();
  assert_eq!(names(&parsed), vec!["a", "b", "c"]);
  assert!(parsed.iter().all(|inv| inv.tag.is_none() && inv.args.is_empty()));
  let positions: Vec<_> = parsed.iter().map(|inv| inv.position).collect();
  assert_eq!(positions, vec![0, 1, 2]);
}

#[test]
fn test_tagged_segment() {
  let parsed = parse("a :: b as x :: c").unwrap();
  assert_eq!(names(&parsed), vec!["a", "b", "c"]);
  assert_eq!(parsed[1].tag, Tag::new("x"));
  assert!(parsed[0].tag.is_none());
  assert!(parsed[2].tag.is_none());
}

#[test]
fn test_tag_after_arguments() {
  let parsed = parse("exec grep -v foo as matches").unwrap();
  assert_eq!(parsed[0].name, "exec");
  assert_eq!(parsed[0].args, "grep -v foo");
  assert_eq!(parsed[0].tag, Tag::new("matches"));
}

#[test]
fn test_arguments_are_kept_verbatim() {
  let parsed = parse("exec   printf '%s  %s' a b   :: json.decode").unwrap();
  assert_eq!(parsed[0].args, "printf '%s  %s' a b");
  assert_eq!(parsed[1].name, "json.decode");
}

#[test]
fn test_markers_inside_quotes_are_arguments() {
  let parsed = parse(r#"render "a :: b as c # d" :: exec echo '))'"#).unwrap();
  assert_eq!(parsed.len(), 2);
  assert_eq!(parsed[0].args, r#""a :: b as c # d""#);
  assert!(parsed[0].tag.is_none());
  assert_eq!(parsed[1].args, "echo '))'");
}

#[test]
fn test_as_inside_a_word_is_not_a_tag() {
  let parsed = parse("exec cat alias basket").unwrap();
  assert_eq!(parsed[0].args, "cat alias basket");
  assert!(parsed[0].tag.is_none());
}

#[test]
fn test_comments() {
  let parsed = parse("# leading comment\na # trailing\n:: b\r\n# another\r:: c").unwrap();
  assert_eq!(names(&parsed), vec!["a", "b", "c"]);
  assert!(parsed[0].args.is_empty());
}

#[test]
fn test_hash_inside_a_word_is_an_argument() {
  let parsed = parse("exec echo a#b").unwrap();
  assert_eq!(parsed[0].args, "echo a#b");
}

#[test]
fn test_single_colon_at_end_terminates() {
  let parsed = parse("a :").unwrap();
  assert_eq!(names(&parsed), vec!["a"]);
  let parsed = parse("a:").unwrap();
  assert_eq!(names(&parsed), vec!["a"]);
}

#[test]
fn test_fork_group() {
  let parsed = parse("((a :: b)) :: c").unwrap();
  assert_eq!(parsed.len(), 2);
  let group = parsed[0].fork.as_ref().unwrap();
  assert_eq!(names(group), vec!["a", "b"]);
  assert_eq!(parsed[1].name, "c");
  assert!(!parsed[1].is_fork());

  // The group counts as a segment, its members follow it.
  assert_eq!(parsed[0].position, 0);
  assert_eq!(group[0].position, 1);
  assert_eq!(group[1].position, 2);
  assert_eq!(parsed[1].position, 3);
}

#[test]
fn test_fork_group_with_tags_and_comments() {
  let parsed = parse("src :: (( # per item\n render \"{{self}}\" as r :: exec wc -c as n )) # done\n :: sink").unwrap();
  assert_eq!(names(&parsed), vec!["src", "", "sink"]);
  let group = parsed[1].fork.as_ref().unwrap();
  assert_eq!(group[0].tag, Tag::new("r"));
  assert_eq!(group[1].args, "wc -c");
  assert_eq!(group[1].tag, Tag::new("n"));
}

#[test]
fn test_nested_fork_groups() {
  let parsed = parse("(( a :: ((b)) ))").unwrap();
  let outer = parsed[0].fork.as_ref().unwrap();
  assert_eq!(outer.len(), 2);
  let inner = outer[1].fork.as_ref().unwrap();
  assert_eq!(names(inner), vec!["b"]);
  assert_eq!(inner[0].position, 3);
}

#[test]
fn test_fork_close_outside_a_group_is_an_argument() {
  let parsed = parse("exec echo ))").unwrap();
  assert_eq!(parsed[0].args, "echo ))");
}

#[test]
fn test_display_round_trips_the_script_shape() {
  let parsed = parse("a x :: ((b as t :: c)) :: d").unwrap();
  let shown: Vec<_> = parsed.iter().map(ToString::to_string).collect();
  assert_eq!(shown, vec!["a x", "(( b as t :: c ))", "d"]);
}

#[test]
fn test_empty_scripts_are_errors() {
  assert_eq!(parse("").unwrap_err(), ParseError::Empty);
  assert_eq!(parse("   \n # only a comment\n").unwrap_err(), ParseError::Empty);
  assert_eq!(parse("::").unwrap_err(), ParseError::MissingName { segment: 0 });
  assert_eq!(parse("::::").unwrap_err(), ParseError::MissingName { segment: 0 });
}

#[test]
fn test_missing_name_between_delimiters() {
  assert_eq!(parse("a :: :: b").unwrap_err(), ParseError::MissingName { segment: 1 });
  assert_eq!(parse("(( a :: ))").unwrap_err(), ParseError::MissingName { segment: 2 });
}

#[test]
fn test_unexpected_character_carries_segment() {
  assert_eq!(
    parse("a :: b$").unwrap_err(),
    ParseError::UnexpectedCharacter { segment: 1, found: '$' }
  );
  assert_eq!(
    parse("a :: (( b :: c! ))").unwrap_err(),
    ParseError::UnexpectedCharacter { segment: 3, found: '!' }
  );
}

#[test]
fn test_tag_errors() {
  assert_eq!(parse("a as").unwrap_err(), ParseError::MissingTag { segment: 0 });
  assert_eq!(parse("a :: b as :: c").unwrap_err(), ParseError::MissingTag { segment: 1 });
  assert_eq!(
    parse("a as x-y").unwrap_err(),
    ParseError::InvalidTag {
      segment: 0,
      tag: "x-y".to_string()
    }
  );
  assert_eq!(
    parse("a as two words").unwrap_err(),
    ParseError::InvalidTag {
      segment: 0,
      tag: "two words".to_string()
    }
  );
}

#[test]
fn test_fork_errors() {
  assert_eq!(parse("(( a :: b").unwrap_err(), ParseError::UnclosedFork { segment: 0 });
  assert_eq!(parse("a :: (( ))").unwrap_err(), ParseError::EmptyFork { segment: 1 });
  assert_eq!(
    parse("((a)) as t").unwrap_err(),
    ParseError::UnexpectedCharacter { segment: 0, found: 'a' }
  );
}

#[test]
fn test_error_messages() {
  assert_eq!(ParseError::Empty.to_string(), "no pipeline described");
  assert_eq!(
    ParseError::MissingTag { segment: 2 }.to_string(),
    "segment 2: expected tag name after `as`"
  );
  assert_eq!(ParseError::EmptyFork { segment: 0 }.segment(), Some(0));
  assert_eq!(ParseError::Empty.segment(), None);
}
