use regex::Captures;

use super::extract::Skeleton;
use crate::error::ReassemblyError;

/// Replaces every token in the serialized skeleton with its unit's escaped
/// translation in one pass.
///
/// Each unit's token has to occur exactly once. A token without a translated
/// unit is left in place and reported; the output is never returned in that
/// case.
pub fn reassemble(skeleton: &Skeleton) -> Result<String, ReassemblyError> {
    let units = &skeleton.units;
    let mut occurrences = vec![0usize; units.len()];
    let mut unresolved: Option<String> = None;

    let output = skeleton
        .scheme
        .pattern()
        .replace_all(&skeleton.html, |caps: &Captures| {
            let token = &caps[0];
            let rendered = caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|index| units.get(index))
                .filter(|unit| unit.token == token)
                .and_then(|unit| {
                    unit.rendered().map(|rendered| {
                        occurrences[unit.position] += 1;
                        rendered
                    })
                });
            match rendered {
                Some(rendered) => rendered,
                None => {
                    unresolved.get_or_insert_with(|| token.to_string());
                    token.to_string()
                }
            }
        });

    if let Some(token) = unresolved {
        return Err(ReassemblyError::Unresolved { token });
    }
    if let Some((position, count)) = occurrences
        .iter()
        .enumerate()
        .find(|(_, count)| **count != 1)
    {
        return Err(ReassemblyError::Occurrences {
            token: units[position].token.clone(),
            occurrences: *count,
        });
    }
    Ok(output.into_owned())
}
