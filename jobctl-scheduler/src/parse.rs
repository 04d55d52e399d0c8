//! Parsers for scheduler client output

use jobctl_core::domain::job::{JobDetails, JobHandle, JobState};
use jobctl_core::{Error, Result};

/// `squeue --format` used for listings
///
/// Fields: id, partition, name, user, state, elapsed, time limit, node count,
/// node list, reason. The reason comes last so it may contain the separator.
pub const SQUEUE_FORMAT: &str = "%i|%P|%j|%u|%T|%M|%l|%D|%N|%R";

const SQUEUE_FIELDS: usize = 10;

/// Parse `squeue --noheader --format SQUEUE_FORMAT` output
pub fn parse_squeue(output: &str) -> Result<Vec<JobHandle>> {
    output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(parse_squeue_line)
        .collect()
}

fn parse_squeue_line(line: &str) -> Result<JobHandle> {
    let fields: Vec<&str> = line.splitn(SQUEUE_FIELDS, '|').map(str::trim).collect();
    if fields.len() != SQUEUE_FIELDS {
        return Err(Error::Parse(format!(
            "expected {} fields in squeue line, got {}: '{}'",
            SQUEUE_FIELDS,
            fields.len(),
            line
        )));
    }

    Ok(JobHandle {
        id: fields[0].to_string(),
        partition: fields[1].to_string(),
        name: fields[2].to_string(),
        user: fields[3].to_string(),
        state: JobState::parse(fields[4]),
        elapsed: fields[5].to_string(),
        time_limit: fields[6].to_string(),
        node_count: fields[7].to_string(),
        node: fields[8].to_string(),
        reason: fields[9].to_string(),
    })
}

/// Parse the one-line record printed by `scontrol --oneliner show job`
///
/// Each whitespace-separated token is a `key=value` pair; only the first `=`
/// splits, so values such as `TRES=cpu=4,mem=16G` survive intact. Tokens
/// without `=` continue the previous value (job names and commands may
/// contain spaces).
pub fn parse_scontrol_record(output: &str) -> Option<JobDetails> {
    let mut fields: Vec<(String, String)> = Vec::new();

    for token in output.split_whitespace() {
        match token.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                fields.push((key.to_string(), value.to_string()));
            }
            _ => {
                if let Some((_, value)) = fields.last_mut() {
                    value.push(' ');
                    value.push_str(token);
                }
            }
        }
    }

    let id = fields
        .iter()
        .find(|(k, _)| k == "JobId")
        .map(|(_, v)| v.clone())?;

    Some(JobDetails { id, fields })
}

/// Extract the job id from `sbatch` output ("Submitted batch job 123")
pub fn parse_submitted_job_id(output: &str) -> Option<String> {
    let marker = "job ";
    output.lines().find_map(|line| {
        let idx = line.find(marker)?;
        let id = line[idx + marker.len()..].split_whitespace().next()?;
        id.chars().all(|c| c.is_ascii_digit()).then(|| id.to_string())
    })
}

/// Whether scheduler stderr reports an unknown job id
pub fn is_unknown_job(stderr: &str) -> bool {
    stderr.contains("Invalid job id specified")
}
