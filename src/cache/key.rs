//! Cache key construction.

use std::fmt::Debug;
use std::panic::Location;

use serde::Serialize;
use tracing::debug;

use crate::error::{CacheError, Result};

/// Prefix of keys derived from the call site when no template is configured
pub const DEFAULT_KEY_PREFIX: &str = "memoize:";

// == Key Argument ==
/// A call argument that can take part in a cache key.
///
/// Arguments are rendered as JSON; when serialization fails the `Debug`
/// rendering is used instead so the cache path never aborts over a key.
pub trait KeyArg: Sync {
    fn key_json(&self) -> serde_json::Result<String>;

    fn key_text(&self) -> String;
}

impl<T: Serialize + Debug + Sync + ?Sized> KeyArg for T {
    fn key_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    fn key_text(&self) -> String {
        format!("{:?}", self)
    }
}

// == Build Cache Key ==
/// Joins `template` with the selected arguments: `template:arg_i:arg_j...`.
///
/// # Errors
/// `CacheError::Config` when an index does not address a supplied argument.
pub fn build_cache_key(template: &str, indices: &[usize], args: &[&dyn KeyArg]) -> Result<String> {
    let mut key = String::from(template);
    for &index in indices {
        let arg = args.get(index).ok_or_else(|| {
            CacheError::Config(format!(
                "parameter index {} out of range for {} argument(s)",
                index,
                args.len()
            ))
        })?;
        key.push(':');
        match arg.key_json() {
            Ok(json) => key.push_str(&json),
            Err(e) => {
                debug!("Argument {} not serializable ({}), using Debug form", index, e);
                key.push_str(&arg.key_text());
            }
        }
    }
    Ok(key)
}

/// Key template used when none is configured: the source location of the
/// invoking call, so every call site caches under its own key.
pub fn default_template(caller: &Location<'_>) -> String {
    format!(
        "{}{}:{}:{}",
        DEFAULT_KEY_PREFIX,
        caller.file(),
        caller.line(),
        caller.column()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_string_argument_is_json_quoted() {
        let key = build_cache_key("svc.getUser", &[0], &[&"alice"]).unwrap();
        assert_eq!(key, "svc.getUser:\"alice\"");
    }

    #[test]
    fn test_indices_select_and_order_arguments() {
        let args: [&dyn KeyArg; 3] = [&1u32, &"skip", &vec![true, false]];
        let key = build_cache_key("k", &[2, 0], &args).unwrap();
        assert_eq!(key, "k:[true,false]:1");
    }

    #[test]
    fn test_no_indices_yields_template() {
        assert_eq!(build_cache_key("plain", &[], &[&42]).unwrap(), "plain");
    }

    #[test]
    fn test_unserializable_argument_falls_back_to_debug() {
        // JSON object keys must be strings, so a tuple-keyed map cannot serialize
        let map: HashMap<(i32, i32), i32> = HashMap::from([((1, 2), 3)]);
        let key = build_cache_key("k", &[0], &[&map]).unwrap();
        assert_eq!(key, "k:{(1, 2): 3}");
    }

    #[test]
    fn test_index_out_of_range_is_config_error() {
        let result = build_cache_key("k", &[1], &[&"only"]);
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[test]
    fn test_default_template_names_call_site() {
        let here = Location::caller();
        let template = default_template(here);
        assert_eq!(
            template,
            format!("memoize:{}:{}:{}", here.file(), here.line(), here.column())
        );
        assert!(template.contains("key.rs:"));
    }

    #[test]
    fn test_default_templates_differ_per_call_site() {
        let first = default_template(Location::caller());
        let second = default_template(Location::caller());
        assert_ne!(first, second);
    }
}
