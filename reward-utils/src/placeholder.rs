use schema::UserProfile;

pub const NAME_FALLBACK: &str = "User";
pub const LOCATION_FALLBACK: &str = "your area";

/// Resolves a single token name, without braces. Returns `None` for unknown tokens.
fn resolve<'a>(token: &str, profile: Option<&'a UserProfile>) -> Option<&'a str> {
    let non_blank = |value: &'a Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let value = match token {
        "userName" => profile.and_then(|p| non_blank(&p.display_name)),
        "firstName" => profile.and_then(|p| {
            non_blank(&p.first_name)
                .or_else(|| non_blank(&p.display_name).and_then(|n| n.split_whitespace().next()))
        }),
        "location" => profile.and_then(|p| non_blank(&p.location)),
        _ => return None,
    };

    Some(match (token, value) {
        (_, Some(value)) => value,
        ("location", None) => LOCATION_FALLBACK,
        (_, None) => NAME_FALLBACK,
    })
}

/// Replaces `{token}` markers with values from the viewer's profile.
///
/// Missing profile fields fall back to a literal. Unknown tokens and unmatched braces are kept as written.
pub fn render(text: &str, profile: Option<&UserProfile>) -> String {
    let mut rendered = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find(['{', '}']) else {
            rendered.push_str(&rest[open..]);
            return rendered;
        };
        // `{{token}`: emit the first brace as text, retry from the second
        if after_open[close..].starts_with('{') {
            rendered.push_str(&rest[open..open + 1 + close]);
            rest = &after_open[close..];
            continue;
        }

        let token = &after_open[..close];
        match resolve(token, profile) {
            Some(value) => rendered.push_str(value),
            None => rendered.push_str(&rest[open..open + close + 2]),
        }
        rest = &after_open[close + 1..];
    }

    rendered.push_str(rest);
    rendered
}
