//! Set-number labeling for raw trial exports
//!
//! Only the set header (the `taskStarted` trial) of each run carries `setNum`.
//! Labeling copies it onto the trials that follow, per user.

use crate::error::CogError;
use crate::types::TrialRecord;
use serde_json::Value;
use std::collections::HashMap;

/// Give every non-header trial the `setNum` of the most recent header of its user.
///
/// Every trial must carry `userId` and `dateTime`, each user's trials must be in
/// non-decreasing `dateTime` order, and a non-header trial must follow a header and
/// must not already carry a set number. Any violation aborts labeling.
pub fn label_set_numbers(trials: &mut [TrialRecord]) -> Result<(), CogError> {
    // user → (dateTime, setNum) of that user's latest trial
    let mut latest: HashMap<String, (String, Option<Value>)> = HashMap::new();

    for (position, trial) in trials.iter_mut().enumerate() {
        let user = trial
            .user_id()
            .ok_or_else(|| CogError::MissingField(format!("userId on trial {}", position)))?
            .to_string();
        let date_time = trial
            .date_time()
            .ok_or_else(|| CogError::MissingField(format!("dateTime on trial {}", position)))?
            .to_string();

        let last = latest.get(&user);
        if let Some((last_date_time, _)) = last {
            // ISO 8601 timestamps order lexically.
            if date_time.as_str() < last_date_time.as_str() {
                return Err(CogError::TrialOrder(format!(
                    "trial {} for user {} is dated {} after a trial dated {}",
                    position, user, date_time, last_date_time
                )));
            }
        }

        if !trial.is_truthy("taskStarted") {
            if trial.is_truthy("setNum") {
                return Err(CogError::InvalidSetNumber(format!(
                    "trial {} is not a set header but already has a set number",
                    position
                )));
            }
            let inherited = match last {
                Some((_, Some(set_num))) => set_num.clone(),
                Some((_, None)) => {
                    return Err(CogError::InvalidSetNumber(format!(
                        "trial {} follows a trial without a set number",
                        position
                    )))
                }
                None => {
                    return Err(CogError::TrialOrder(format!(
                        "trial {} for user {} has no preceding set header",
                        position, user
                    )))
                }
            };
            trial.insert("setNum", inherited);
        }

        let set_num = trial.field("setNum").or_else(|| trial.get("setNum")).cloned();
        latest.insert(user, (date_time, set_num));
    }
    Ok(())
}
