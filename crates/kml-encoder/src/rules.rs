//! Scale-dependent rule selection.
//!
//! Rules are picked per feature-type style. Within one feature-type style the
//! regular rules are tried first; else-rules only come into play when none of
//! them matched the feature.

use kml_common::{Feature, FeatureTypeStyle, Filter, Rule, Style, Symbolizer};
use tracing::warn;

/// Slack allowed on both ends of a rule's scale range.
pub const TOLERANCE: f64 = 1e-6;

/// `min_scale - TOLERANCE <= scale < max_scale + TOLERANCE`
pub fn is_within_scale(rule: &Rule, scale_denominator: f64) -> bool {
    rule.min_scale - TOLERANCE <= scale_denominator
        && scale_denominator < rule.max_scale + TOLERANCE
}

/// Select the rules that apply to `feature` at the given scale, in source
/// order. A rule whose filter cannot be evaluated is treated as not matching.
pub fn filter_rules<'a>(
    rules: &[&'a Rule],
    feature: &Feature,
    scale_denominator: f64,
) -> Vec<&'a Rule> {
    let mut selected = Vec::new();
    let mut has_else = false;

    for rule in rules {
        if rule.else_filter {
            has_else = true;
            continue;
        }
        if !is_within_scale(rule, scale_denominator) {
            continue;
        }
        let matched = match &rule.filter {
            None => true,
            Some(filter) => filter.evaluate(feature).unwrap_or_else(|e| {
                warn!(feature = %feature.id, rule = ?rule.name, error = %e, "Rule filter failed");
                false
            }),
        };
        if matched {
            selected.push(*rule);
        }
    }

    if selected.is_empty() && has_else {
        selected.extend(
            rules
                .iter()
                .copied()
                .filter(|r| r.else_filter && is_within_scale(r, scale_denominator)),
        );
    }

    selected
}

/// Feature-type styles that apply to the named feature type.
pub fn filter_feature_type_styles<'a>(
    style: &'a Style,
    type_name: &str,
) -> Vec<&'a FeatureTypeStyle> {
    style
        .feature_type_styles
        .iter()
        .filter(|fts| fts.applies_to(type_name))
        .collect()
}

/// All rules of the applicable feature-type styles.
pub fn layer_rules<'a>(style: &'a Style, type_name: &str) -> Vec<&'a Rule> {
    filter_feature_type_styles(style, type_name)
        .into_iter()
        .flat_map(|fts| fts.rules.iter())
        .collect()
}

/// The rules that paint `feature`, evaluated feature-type style by
/// feature-type style so else-rules stay local to their own group.
pub fn select_rules<'a>(
    style: &'a Style,
    type_name: &str,
    feature: &Feature,
    scale_denominator: f64,
) -> Vec<&'a Rule> {
    filter_feature_type_styles(style, type_name)
        .into_iter()
        .flat_map(|fts| {
            let rules: Vec<&Rule> = fts.rules.iter().collect();
            filter_rules(&rules, feature, scale_denominator)
        })
        .collect()
}

pub fn symbolizers_of<'a>(rules: &[&'a Rule]) -> Vec<&'a Symbolizer> {
    rules.iter().flat_map(|r| r.symbolizers.iter()).collect()
}

/// Collapse the rule filters into one query filter.
///
/// Returns `Exclude` when only else-rules exist or nothing is in scale, and
/// `Include` as soon as one in-scale rule has no filter. A scale of zero or
/// less disables the scale check.
pub fn summarize_rule_filters(rules: &[&Rule], scale_denominator: f64) -> Filter {
    let (regular, else_rules): (Vec<&Rule>, Vec<&Rule>) =
        rules.iter().copied().partition(|r| !r.else_filter);

    if regular.is_empty() && !else_rules.is_empty() {
        return Filter::Exclude;
    }

    let mut filters = Vec::new();
    for rule in regular {
        if scale_denominator <= 0.0 || is_within_scale(rule, scale_denominator) {
            match &rule.filter {
                None | Some(Filter::Include) => return Filter::Include,
                Some(f) => filters.push(f.clone()),
            }
        }
    }

    Filter::or(filters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kml_common::style::{LineSymbolizer, PolygonSymbolizer};
    use kml_common::{Coordinate, Geometry};
    use serde_json::json;

    fn feature(kind: &str) -> Feature {
        Feature::new("roads.1", Geometry::Point(Coordinate::new(0.0, 0.0)))
            .with_attribute("kind", kind)
    }

    fn kind_is(kind: &str) -> Filter {
        Filter::Equals {
            property: "kind".into(),
            value: json!(kind),
        }
    }

    fn line() -> Vec<Symbolizer> {
        vec![Symbolizer::Line(LineSymbolizer::default())]
    }

    #[test]
    fn test_scale_range_tolerance() {
        let rule = Rule::new(line()).with_scale_range(1000.0, 5000.0);
        assert!(is_within_scale(&rule, 1000.0));
        assert!(is_within_scale(&rule, 1000.0 - 1e-7));
        assert!(is_within_scale(&rule, 4999.9));
        assert!(is_within_scale(&rule, 5000.0));
        assert!(!is_within_scale(&rule, 5000.1));
        assert!(!is_within_scale(&rule, 999.0));
    }

    #[test]
    fn test_else_rules_excluded_when_regular_matches() {
        let highway = Rule::new(line()).with_filter(kind_is("highway")).named("highway");
        let other = Rule::new(line()).as_else().named("other");
        let rules = vec![&highway, &other];

        let picked = filter_rules(&rules, &feature("highway"), 1e6);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name.as_deref(), Some("highway"));

        let picked = filter_rules(&rules, &feature("path"), 1e6);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name.as_deref(), Some("other"));
    }

    #[test]
    fn test_out_of_scale_else_rule_dropped() {
        let regular = Rule::new(line()).with_filter(kind_is("highway"));
        let near = Rule::new(line()).as_else().with_scale_range(0.0, 1000.0);
        let any = Rule::new(line()).as_else().named("any");
        let rules = vec![&regular, &near, &any];

        let picked = filter_rules(&rules, &feature("path"), 1e6);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name.as_deref(), Some("any"));
    }

    #[test]
    fn test_source_order_and_empty() {
        let a = Rule::new(line()).named("a");
        let b = Rule::new(line()).named("b");
        let rules = vec![&a, &b];
        let names: Vec<_> = filter_rules(&rules, &feature("x"), 1.0)
            .iter()
            .map(|r| r.name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(filter_rules(&[], &feature("x"), 1.0).is_empty());
    }

    #[test]
    fn test_failing_filter_does_not_match() {
        let rule = Rule::new(line()).with_filter(Filter::GreaterThan {
            property: "kind".into(),
            value: 3.0,
        });
        assert!(filter_rules(&[&rule], &feature("highway"), 1.0).is_empty());
    }

    #[test]
    fn test_summarize() {
        let highway = Rule::new(line()).with_filter(kind_is("highway"));
        let path = Rule::new(line()).with_filter(kind_is("path"));
        let tiny = Rule::new(line()).with_scale_range(0.0, 10.0);
        let otherwise = Rule::new(line()).as_else();

        assert_eq!(summarize_rule_filters(&[&otherwise], 1e6), Filter::Exclude);
        assert_eq!(summarize_rule_filters(&[], 1e6), Filter::Exclude);
        assert_eq!(summarize_rule_filters(&[&highway, &tiny], 5.0), Filter::Include);
        assert_eq!(
            summarize_rule_filters(&[&highway, &tiny, &otherwise], 1e6),
            kind_is("highway")
        );
        assert_eq!(
            summarize_rule_filters(&[&highway, &path], 1e6),
            Filter::Or {
                filters: vec![kind_is("highway"), kind_is("path")]
            }
        );
        // scale checks off
        assert_eq!(summarize_rule_filters(&[&highway, &tiny], 0.0), Filter::Include);
    }

    #[test]
    fn test_feature_type_style_selection() {
        let style: Style = serde_json::from_value(json!({
            "name": "mixed",
            "feature_type_styles": [
                { "feature_type_names": ["Roads"], "rules": [{ "name": "r", "symbolizers": [{ "type": "line" }] }] },
                { "feature_type_names": ["rivers"], "rules": [{ "name": "w", "symbolizers": [{ "type": "line" }] }] },
                { "rules": [{ "name": "all", "symbolizers": [{ "type": "polygon" }] }] }
            ]
        }))
        .unwrap();

        assert_eq!(filter_feature_type_styles(&style, "roads").len(), 2);
        let names: Vec<_> = layer_rules(&style, "rivers")
            .iter()
            .map(|r| r.name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["w", "all"]);

        let picked = select_rules(&style, "roads", &feature("x"), 1.0);
        let symbolizers = symbolizers_of(&picked);
        assert_eq!(symbolizers.len(), 2);
        assert!(matches!(symbolizers[1], Symbolizer::Polygon(PolygonSymbolizer { .. })));
    }
}
