use crate::dump::RecordStream;
use crate::error::Result;
use crate::model::{IdSet, Record, VoteTotals};
use crate::progress::{Progress, ProgressFn, PROGRESS_INTERVAL};

/// Net score per wanted post from a single pass over the vote stream.
///
/// Every wanted id seen at least once gets an entry, even when its votes cancel out.
/// Ids never voted on are absent.
pub fn total_votes<S: RecordStream>(mut votes: S, wanted: &IdSet, progress: ProgressFn<'_>) -> Result<VoteTotals> {
    let mut totals = VoteTotals::new();
    let mut read = 0u64;
    let mut counted = 0u64;
    while let Some(record) = votes.next() {
        let record = record?;
        read += 1;
        if let Record::Vote(vote) = record {
            if wanted.contains(&vote.post_id) {
                *totals.entry(vote.post_id).or_insert(0) += vote.vote_type().delta();
                counted += 1;
            }
        }
        if read % PROGRESS_INTERVAL == 0 {
            progress(&Progress {
                records_read: read,
                completed: counted,
                percent: votes.percent_read(),
                phase: "Totalling votes",
            });
        }
    }
    tracing::info!(
        votes_read = read,
        votes_counted = counted,
        posts_with_votes = totals.len(),
        skipped_rows = votes.skipped_rows(),
        "vote totals complete"
    );
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::MemoryStream;
    use crate::model::Vote;
    use crate::progress::silent;

    fn vote(post_id: i64, vote_type: i64) -> Record {
        Record::Vote(Vote { post_id, vote_type_id: Some(vote_type), ..Vote::default() })
    }

    #[test]
    fn nets_up_and_down_votes() {
        let stream = MemoryStream::new(vec![vote(1, 2), vote(1, 2), vote(1, 3), vote(2, 2), vote(99, 2)]);
        let wanted: IdSet = [1, 2, 3].into_iter().collect();
        let totals = total_votes(stream, &wanted, &mut silent).unwrap();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[&1], 1);
        assert_eq!(totals[&2], 1);
        assert!(!totals.contains_key(&99));
        assert!(!totals.contains_key(&3));
    }

    #[test]
    fn other_vote_types_register_a_zero_entry() {
        let stream = MemoryStream::new(vec![vote(5, 1), vote(5, 10), vote(6, 2), vote(6, 3)]);
        let wanted: IdSet = [5, 6].into_iter().collect();
        let totals = total_votes(stream, &wanted, &mut silent).unwrap();
        assert_eq!(totals.get(&5), Some(&0));
        assert_eq!(totals.get(&6), Some(&0));
    }

    #[test]
    fn order_does_not_matter() {
        let forward = vec![vote(1, 2), vote(1, 3), vote(1, 3), vote(2, 2)];
        let mut backward = forward.clone();
        backward.reverse();
        let wanted: IdSet = [1, 2].into_iter().collect();
        let a = total_votes(MemoryStream::new(forward), &wanted, &mut silent).unwrap();
        let b = total_votes(MemoryStream::new(backward), &wanted, &mut silent).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[&1], -1);
    }

    #[test]
    fn reports_progress_periodically() {
        let records: Vec<Record> = (0..250).map(|i| vote(i, 2)).collect();
        let wanted: IdSet = (0..10).collect();
        let mut calls = Vec::new();
        total_votes(MemoryStream::new(records), &wanted, &mut |p: &Progress| calls.push(p.clone())).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].records_read, 100);
        assert_eq!(calls[1].percent, 80.0);
        assert_eq!(calls[1].completed, 10);
    }
}
