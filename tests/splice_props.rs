//! Property tests for marker splicing and block stripping

use panelpatch::core::patch::{AnchorError, AnchorSpec, BlockBounds, Placement, contains_token, splice, strip_block};
use proptest::prelude::*;

const MARKER: &str = "panelpatch:prop-test";

/// Host lines never contain uppercase, so neither the anchor nor a marker.
fn host_lines() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z {};=]{0,16}", 0..10)
}

fn placement() -> impl Strategy<Value = Placement> {
    prop_oneof![Just(Placement::Before), Just(Placement::After)]
}

fn payload(bounds: &BlockBounds, body: &[String]) -> String {
    let mut out = format!("# {}\n", bounds.begin);
    for line in body {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&format!("# {}\n", bounds.end));
    out
}

proptest! {
    #[test]
    fn splice_then_strip_is_identity(
        before in host_lines(),
        after in host_lines(),
        body in host_lines(),
        placement in placement(),
        terminated in any::<bool>(),
    ) {
        let mut lines = before.clone();
        lines.push("ANCHOR_LINE".to_string());
        lines.extend(after.iter().cloned());
        let mut content = lines.join("\n");
        if terminated {
            content.push('\n');
        }

        let bounds = BlockBounds::for_marker(MARKER);
        let anchor = AnchorSpec::new("ANCHOR_LINE", placement).unwrap();
        let spliced = splice(&content, &anchor, &payload(&bounds, &body)).unwrap();

        prop_assert!(contains_token(&spliced, MARKER));
        prop_assert!(!contains_token(&content, MARKER));
        prop_assert!(spliced.lines().any(|l| l == "ANCHOR_LINE"));
        prop_assert_eq!(strip_block(&spliced, &bounds), Some(content));
    }

    #[test]
    fn missing_anchor_leaves_content_alone(lines in host_lines(), placement in placement()) {
        let content = lines.join("\n");
        let anchor = AnchorSpec::new("ANCHOR_LINE", placement).unwrap();
        prop_assert_eq!(splice(&content, &anchor, "# x\n"), Err(AnchorError::NotFound));
        prop_assert_eq!(strip_block(&content, &BlockBounds::for_marker(MARKER)), None);
    }

    #[test]
    fn marker_glued_to_a_longer_name_is_not_present(suffix in "[a-z0-9_-]{1,8}") {
        let text = format!("// BEGIN {MARKER}{suffix}\n");
        prop_assert!(!contains_token(&text, MARKER));
    }
}
