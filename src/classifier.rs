//! Pairwise duplicate resolution within one candidate group.

use std::mem;

use crate::fragment::{Fragment, FragmentStatus};

/// Compare `fragment` against the live candidates at one position.
///
/// With no candidate sharing its coordinate key the fragment joins the group
/// and nothing is returned. Otherwise both get `duplicate_count` of the
/// resident plus one, the higher average base quality becomes PRIMARY and
/// stays in the group, and the DUPLICATE is returned. On equal quality the
/// resident wins.
pub fn check_duplicate(mut fragment: Fragment, group: &mut Vec<Fragment>) -> Option<Fragment> {
    let Some(index) = group
        .iter()
        .position(|other| other.coordinates.key == fragment.coordinates.key)
    else {
        group.push(fragment);
        return None;
    };

    let other = &mut group[index];
    let count = other.duplicate_count + 1;
    other.duplicate_count = count;
    fragment.duplicate_count = count;

    if fragment.average_base_quality() > other.average_base_quality() {
        fragment.status = FragmentStatus::Primary;
        other.status = FragmentStatus::Duplicate;
        Some(mem::replace(other, fragment))
    } else {
        fragment.status = FragmentStatus::Duplicate;
        other.status = FragmentStatus::Primary;
        Some(fragment)
    }
}
