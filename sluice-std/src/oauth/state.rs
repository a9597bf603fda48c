//! Authorization request state.
//!
//! The `state` parameter sent to the provider carries the caller's original
//! state followed by optional markers:
//!
//! ```text
//! <original>[:resourceOwnerId=<id>][:onCompleteRedirectTo=<url>]
//! ```

const RESOURCE_OWNER_MARKER: &str = ":resourceOwnerId=";
const ON_COMPLETE_REDIRECT_TO_MARKER: &str = ":onCompleteRedirectTo=";

/// Builds the state parameter of an authorization request.
pub fn encode_state(
    original: Option<&str>,
    resource_owner_id: Option<&str>,
    on_complete_redirect_to: Option<&str>,
) -> String {
    let mut state = original.unwrap_or_default().to_owned();
    if let Some(owner) = resource_owner_id {
        state.push_str(RESOURCE_OWNER_MARKER);
        state.push_str(owner);
    }
    if let Some(url) = on_complete_redirect_to {
        state.push_str(ON_COMPLETE_REDIRECT_TO_MARKER);
        state.push_str(url);
    }
    state
}

/// The parts of a decoded state parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedState {
    /// The caller's original state.
    pub original: Option<String>,
    /// Owner the tokens belong to.
    pub resource_owner_id: Option<String>,
    /// Where to send the user once the redirect was handled.
    pub on_complete_redirect_to: Option<String>,
}

/// Splits a state parameter produced by [`encode_state`].
pub fn decode_state(state: Option<&str>) -> DecodedState {
    let Some(state) = state else {
        return DecodedState::default();
    };

    let owner_at = state.find(RESOURCE_OWNER_MARKER);
    let redirect_at = state.find(ON_COMPLETE_REDIRECT_TO_MARKER);

    let original_end = match (owner_at, redirect_at) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) | (None, Some(a)) => a,
        (None, None) => state.len(),
    };
    let resource_owner_id = owner_at.map(|at| {
        let start = at + RESOURCE_OWNER_MARKER.len();
        let end = redirect_at.filter(|&r| r > start).unwrap_or(state.len());
        state[start..end].to_owned()
    });
    let on_complete_redirect_to =
        redirect_at.map(|at| state[at + ON_COMPLETE_REDIRECT_TO_MARKER.len()..].to_owned());

    DecodedState {
        original: non_empty(&state[..original_end]),
        resource_owner_id: resource_owner_id.filter(|s| !s.is_empty()),
        on_complete_redirect_to: on_complete_redirect_to.filter(|s| !s.is_empty() && s != "null"),
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_state() {
        let state = encode_state(Some("xyz"), Some("user1"), Some("http://app/done?a=1"));
        assert_eq!(
            state,
            "xyz:resourceOwnerId=user1:onCompleteRedirectTo=http://app/done?a=1"
        );
        assert_eq!(
            decode_state(Some(&state)),
            DecodedState {
                original: Some("xyz".into()),
                resource_owner_id: Some("user1".into()),
                on_complete_redirect_to: Some("http://app/done?a=1".into()),
            }
        );
    }

    #[test]
    fn test_partial_states() {
        let only_owner = decode_state(Some(":resourceOwnerId=u"));
        assert_eq!(only_owner.original, None);
        assert_eq!(only_owner.resource_owner_id.as_deref(), Some("u"));
        assert_eq!(only_owner.on_complete_redirect_to, None);

        let plain = decode_state(Some("abc"));
        assert_eq!(plain.original.as_deref(), Some("abc"));
        assert_eq!(plain.resource_owner_id, None);

        assert_eq!(decode_state(None), DecodedState::default());
    }
}
