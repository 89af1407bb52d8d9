//! Correlation of server-returned items to the staged items that produced
//! them.
//!
//! The server assigns its own ids and does not echo client-local ids, so
//! matching is two-phase: the batch-local sequence number the server echoes
//! back is authoritative, and business keys (patient, category, code, site)
//! are the fallback for servers that drop the sequence. Each side matches at
//! most once; leftovers are reported, never guessed at.

use tracing::{debug, warn};

use crate::identity::ClientId;
use crate::model::BusinessKey;
use crate::protocol::ServerItem;

/// One entry of a submitted batch, as remembered for correlation.
#[derive(Debug, Clone)]
pub struct SubmittedItem {
    /// Batch-local ordinal carried on the wire.
    pub sequence: u32,
    pub client_id: ClientId,
    pub key: BusinessKey,
}

/// Result of correlating a server response against a submitted batch.
#[derive(Debug, Default)]
pub struct CorrelationOutcome {
    /// Staged item and the server item resolved to it, in response order.
    pub matched: Vec<(ClientId, ServerItem)>,
    /// Submitted entries no server item resolved to, in submission order.
    pub unmatched: Vec<ClientId>,
    /// Server items resolving to nothing we submitted.
    pub orphaned: Vec<ServerItem>,
}

/// Match server items to submitted entries.
///
/// Pure function over snapshots: for each server item, an echoed sequence
/// that names an unclaimed submitted entry wins outright (a business-key
/// mismatch on such a match is logged but tolerated, since the server is
/// authoritative for identity); otherwise the first unclaimed entry with
/// equal business keys is taken. Duplicate or unknown sequences from a
/// misbehaving server degrade to key matching rather than double-claiming.
pub fn correlate(submitted: &[SubmittedItem], returned: &[ServerItem]) -> CorrelationOutcome {
    let mut claimed = vec![false; submitted.len()];
    let mut outcome = CorrelationOutcome::default();

    for server_item in returned {
        let by_sequence = server_item.sequence.and_then(|sequence| {
            submitted
                .iter()
                .position(|entry| entry.sequence == sequence)
        });

        let position = match by_sequence {
            Some(idx) if !claimed[idx] => {
                if submitted[idx].key != server_item.business_key() {
                    warn!(
                        client_id = %submitted[idx].client_id,
                        server_id = %server_item.server_id,
                        sequence = submitted[idx].sequence,
                        "Sequence match with mismatched business keys, trusting sequence"
                    );
                }
                Some(idx)
            }
            Some(idx) => {
                warn!(
                    sequence = submitted[idx].sequence,
                    server_id = %server_item.server_id,
                    "Duplicate sequence in server response, falling back to key match"
                );
                find_by_key(submitted, &claimed, server_item)
            }
            None => {
                if server_item.sequence.is_some() {
                    warn!(
                        server_id = %server_item.server_id,
                        echoed_sequence = server_item.sequence,
                        "Server echoed a sequence we never sent, falling back to key match"
                    );
                }
                find_by_key(submitted, &claimed, server_item)
            }
        };

        match position {
            Some(idx) => {
                claimed[idx] = true;
                outcome
                    .matched
                    .push((submitted[idx].client_id.clone(), server_item.clone()));
            }
            None => {
                warn!(
                    server_id = %server_item.server_id,
                    patient_id = %server_item.patient_id,
                    code = %server_item.code,
                    "Server item matches no submitted entry"
                );
                outcome.orphaned.push(server_item.clone());
            }
        }
    }

    for (idx, entry) in submitted.iter().enumerate() {
        if !claimed[idx] {
            outcome.unmatched.push(entry.client_id.clone());
        }
    }

    debug!(
        submitted = submitted.len(),
        returned = returned.len(),
        matched = outcome.matched.len(),
        unmatched = outcome.unmatched.len(),
        orphaned = outcome.orphaned.len(),
        "Correlated batch response"
    );

    outcome
}

fn find_by_key(
    submitted: &[SubmittedItem],
    claimed: &[bool],
    server_item: &ServerItem,
) -> Option<usize> {
    let key = server_item.business_key();
    submitted
        .iter()
        .enumerate()
        .find(|(idx, entry)| !claimed[*idx] && entry.key == key)
        .map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemCategory, ItemPayload, PatientId, ServerId};

    fn entry(sequence: u32, code: &str, site: Option<&str>) -> SubmittedItem {
        let mut payload = ItemPayload::new(PatientId(7), ItemCategory::Procedure, code);
        if let Some(site) = site {
            payload = payload.with_site(site);
        }
        SubmittedItem {
            sequence,
            client_id: ClientId::compose(1000 + u64::from(sequence), sequence + 1).unwrap(),
            key: payload.business_key(),
        }
    }

    fn server_item(server_id: i64, sequence: Option<u32>, code: &str, site: Option<&str>) -> ServerItem {
        ServerItem {
            server_id: ServerId(server_id),
            sequence,
            patient_id: PatientId(7),
            category: ItemCategory::Procedure,
            code: code.to_string(),
            site: site.map(str::to_string),
        }
    }

    #[test]
    fn test_sequence_match_wins() {
        let submitted = vec![entry(0, "D0120", None), entry(1, "D2391", Some("14"))];
        let returned = vec![
            server_item(100, Some(1), "D2391", Some("14")),
            server_item(101, Some(0), "D0120", None),
        ];

        let outcome = correlate(&submitted, &returned);
        assert_eq!(outcome.matched.len(), 2);
        assert_eq!(outcome.matched[0].0, submitted[1].client_id);
        assert_eq!(outcome.matched[1].0, submitted[0].client_id);
        assert!(outcome.unmatched.is_empty());
        assert!(outcome.orphaned.is_empty());
    }

    #[test]
    fn test_identical_keys_disambiguated_by_sequence() {
        // Two identical extractions; only the sequence can tell them apart.
        let submitted = vec![entry(0, "D7140", Some("18")), entry(1, "D7140", Some("18"))];
        let returned = vec![
            server_item(200, Some(1), "D7140", Some("18")),
            server_item(201, Some(0), "D7140", Some("18")),
        ];

        let outcome = correlate(&submitted, &returned);
        assert_eq!(outcome.matched[0].0, submitted[1].client_id);
        assert_eq!(outcome.matched[0].1.server_id, ServerId(200));
        assert_eq!(outcome.matched[1].0, submitted[0].client_id);
        assert_eq!(outcome.matched[1].1.server_id, ServerId(201));
    }

    #[test]
    fn test_key_fallback_without_sequence() {
        let submitted = vec![entry(0, "D0120", None), entry(1, "D2391", Some("14"))];
        let returned = vec![server_item(300, None, "D2391", Some("14"))];

        let outcome = correlate(&submitted, &returned);
        assert_eq!(outcome.matched.len(), 1);
        assert_eq!(outcome.matched[0].0, submitted[1].client_id);
        assert_eq!(outcome.unmatched, vec![submitted[0].client_id.clone()]);
    }

    #[test]
    fn test_sequence_trusted_over_mismatched_keys() {
        let submitted = vec![entry(0, "D0120", None)];
        // Server normalized the code but echoed our sequence.
        let returned = vec![server_item(400, Some(0), "D0120-N", None)];

        let outcome = correlate(&submitted, &returned);
        assert_eq!(outcome.matched.len(), 1);
        assert!(outcome.orphaned.is_empty());
    }

    #[test]
    fn test_duplicate_sequence_never_double_matches() {
        let submitted = vec![entry(0, "D0120", None), entry(1, "D2391", Some("14"))];
        let returned = vec![
            server_item(500, Some(0), "D0120", None),
            server_item(501, Some(0), "D2391", Some("14")),
        ];

        let outcome = correlate(&submitted, &returned);
        assert_eq!(outcome.matched.len(), 2);
        // First claims entry 0 by sequence; second degrades to key match.
        assert_eq!(outcome.matched[0].0, submitted[0].client_id);
        assert_eq!(outcome.matched[1].0, submitted[1].client_id);
    }

    #[test]
    fn test_unknown_sequence_falls_back_to_keys() {
        let submitted = vec![entry(0, "D0120", None)];
        let returned = vec![server_item(600, Some(42), "D0120", None)];

        let outcome = correlate(&submitted, &returned);
        assert_eq!(outcome.matched.len(), 1);
    }

    #[test]
    fn test_orphaned_server_item_reported() {
        let submitted = vec![entry(0, "D0120", None)];
        let returned = vec![
            server_item(700, Some(0), "D0120", None),
            server_item(701, None, "D9999", None),
        ];

        let outcome = correlate(&submitted, &returned);
        assert_eq!(outcome.matched.len(), 1);
        assert_eq!(outcome.orphaned.len(), 1);
        assert_eq!(outcome.orphaned[0].server_id, ServerId(701));
    }

    #[test]
    fn test_short_response_leaves_unmatched_in_submission_order() {
        let submitted = vec![
            entry(0, "D0120", None),
            entry(1, "D2391", Some("14")),
            entry(2, "D1110", None),
        ];
        let returned = vec![server_item(800, Some(1), "D2391", Some("14"))];

        let outcome = correlate(&submitted, &returned);
        assert_eq!(
            outcome.unmatched,
            vec![submitted[0].client_id.clone(), submitted[2].client_id.clone()]
        );
    }

    #[test]
    fn test_empty_response_leaves_everything_unmatched() {
        let submitted = vec![entry(0, "D0120", None), entry(1, "D1110", None)];
        let outcome = correlate(&submitted, &[]);
        assert_eq!(outcome.matched.len(), 0);
        assert_eq!(outcome.unmatched.len(), 2);
    }
}
