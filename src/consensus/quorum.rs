/// Should a suggestion with `voter_count` votes close in a group of
/// `member_count` members?
///
/// Requires a strict majority: `voter_count > member_count / 2`, with the
/// division taken exactly, so a tie never closes.
pub fn should_close(voter_count: usize, member_count: usize) -> bool {
    voter_count.saturating_mul(2) > member_count
}
