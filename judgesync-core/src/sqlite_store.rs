//! SQLite-backed store
//!
//! Keeps problems, contests, teams, test cases and jury submissions in a
//! judge-style schema. Ranks are unique per problem and foreign keys are
//! enforced, so every ordering mistake of a plan surfaces as a constraint
//! error instead of silently corrupting data. File databases run in WAL mode.

use crate::fingerprint::{stored, Fingerprint};
use crate::store::{
    ContestInfo, NewSubmission, PersistedTestCase, Store, StoreError, StoreResult, StoreTransaction,
    SubmissionFileRow, SubmissionRow, TestCaseContent, TestCaseRecord,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS problem (
    probid INTEGER PRIMARY KEY,
    externalid TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS team (
    teamid INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS contest (
    cid INTEGER PRIMARY KEY,
    shortname TEXT NOT NULL UNIQUE,
    starttime REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS contestproblem (
    cid INTEGER NOT NULL REFERENCES contest(cid) ON DELETE CASCADE,
    probid INTEGER NOT NULL REFERENCES problem(probid) ON DELETE CASCADE,
    shortname TEXT NOT NULL,
    PRIMARY KEY (cid, probid)
);
CREATE TABLE IF NOT EXISTS testcase (
    testcaseid INTEGER PRIMARY KEY,
    probid INTEGER NOT NULL REFERENCES problem(probid),
    rank INTEGER NOT NULL,
    orig_input_filename TEXT,
    description TEXT,
    md5sum_input TEXT,
    md5sum_output TEXT,
    sample INTEGER NOT NULL DEFAULT 0,
    image_type TEXT,
    deleted INTEGER NOT NULL DEFAULT 0,
    UNIQUE (probid, rank)
);
CREATE TABLE IF NOT EXISTS testcase_content (
    testcaseid INTEGER PRIMARY KEY REFERENCES testcase(testcaseid),
    input BLOB,
    output BLOB,
    image BLOB,
    image_thumb BLOB
);
CREATE TABLE IF NOT EXISTS submission (
    submitid INTEGER PRIMARY KEY,
    origsubmitid INTEGER REFERENCES submission(submitid) ON DELETE SET NULL,
    cid INTEGER NOT NULL REFERENCES contest(cid),
    teamid INTEGER NOT NULL REFERENCES team(teamid),
    probid INTEGER NOT NULL REFERENCES problem(probid),
    langid TEXT NOT NULL,
    submittime REAL NOT NULL,
    valid INTEGER NOT NULL DEFAULT 1,
    expected_results TEXT
);
CREATE TABLE IF NOT EXISTS submission_file (
    submitfileid INTEGER PRIMARY KEY,
    submitid INTEGER NOT NULL REFERENCES submission(submitid),
    filename TEXT NOT NULL,
    rank INTEGER NOT NULL,
    sourcecode BLOB NOT NULL,
    md5sum TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS submission_problem ON submission (probid, cid, teamid);
CREATE INDEX IF NOT EXISTS submission_file_submission ON submission_file (submitid);
";

fn init_schema(conn: &Connection) -> StoreResult<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// `?,?,?` for an `IN (..)` list of `n` values
fn list_param(n: usize) -> String {
    vec!["?"; n].join(",")
}

fn to_epoch(time: DateTime<Utc>) -> f64 {
    time.timestamp_millis() as f64 / 1000.0
}

fn from_epoch(seconds: f64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis((seconds * 1000.0).round() as i64)
        .ok_or_else(|| StoreError::InvalidValue(format!("timestamp {}", seconds)))
}

/// Turn unique and foreign key violations into [`StoreError::Constraint`].
fn constraint(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::SqliteFailure(err, message) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
            StoreError::Constraint(message.unwrap_or_else(|| err.to_string()))
        }
        other => StoreError::Database(other),
    }
}

fn expect_one(changed: usize, what: &str, id: i64) -> StoreResult<()> {
    if changed == 0 {
        return Err(StoreError::NotFound(format!("{} {}", what, id)));
    }
    Ok(())
}

/// SQLite database holding the judge's data
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (and if needed create) a database file.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "cache_size", "-64000")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        init_schema(&conn)?;
        tracing::debug!("Opened store at {:?}", path);
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Raw connection, for administrative queries outside the reconciler
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create a problem or rename it, returning its id.
    pub fn ensure_problem(&self, external_id: &str, name: &str) -> StoreResult<i64> {
        self.conn.execute(
            "INSERT INTO problem (externalid, name) VALUES (?1, ?2) \
             ON CONFLICT(externalid) DO UPDATE SET name = excluded.name",
            params![external_id, name],
        )?;
        self.problem_id(external_id)?
            .ok_or_else(|| StoreError::NotFound(format!("problem {}", external_id)))
    }

    pub fn ensure_team(&self, name: &str) -> StoreResult<i64> {
        self.conn.execute(
            "INSERT INTO team (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
            params![name],
        )?;
        self.team_id(name)?
            .ok_or_else(|| StoreError::NotFound(format!("team {}", name)))
    }

    /// Create a contest or move its start time, returning its id.
    pub fn ensure_contest(&self, shortname: &str, start_time: DateTime<Utc>) -> StoreResult<i64> {
        self.conn.execute(
            "INSERT INTO contest (shortname, starttime) VALUES (?1, ?2) \
             ON CONFLICT(shortname) DO UPDATE SET starttime = excluded.starttime",
            params![shortname, to_epoch(start_time)],
        )?;
        self.contest_id(shortname)?
            .ok_or_else(|| StoreError::NotFound(format!("contest {}", shortname)))
    }

    pub fn link_contest_problem(&self, contest_id: i64, problem_id: i64, shortname: &str) -> StoreResult<()> {
        self.conn
            .execute(
                "INSERT INTO contestproblem (cid, probid, shortname) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(cid, probid) DO UPDATE SET shortname = excluded.shortname",
                params![contest_id, problem_id, shortname],
            )
            .map_err(constraint)?;
        Ok(())
    }

    pub fn problem_id(&self, external_id: &str) -> StoreResult<Option<i64>> {
        Ok(self
            .conn
            .query_row("SELECT probid FROM problem WHERE externalid = ?1", params![external_id], |r| r.get(0))
            .optional()?)
    }

    pub fn team_id(&self, name: &str) -> StoreResult<Option<i64>> {
        Ok(self
            .conn
            .query_row("SELECT teamid FROM team WHERE name = ?1", params![name], |r| r.get(0))
            .optional()?)
    }

    pub fn contest_id(&self, shortname: &str) -> StoreResult<Option<i64>> {
        Ok(self
            .conn
            .query_row("SELECT cid FROM contest WHERE shortname = ?1", params![shortname], |r| r.get(0))
            .optional()?)
    }
}

impl Store for SqliteStore {
    fn begin(&mut self) -> StoreResult<Box<dyn StoreTransaction + '_>> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(Box::new(SqliteTransaction { tx }))
    }
}

/// One immediate SQLite transaction; rolled back on drop unless committed
pub struct SqliteTransaction<'c> {
    tx: Transaction<'c>,
}

fn read_test_case(row: &rusqlite::Row) -> rusqlite::Result<PersistedTestCase> {
    let input: Option<String> = row.get(4)?;
    let output: Option<String> = row.get(5)?;
    Ok(PersistedTestCase {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        rank: row.get(3)?,
        input_hash: stored(input.as_deref()),
        output_hash: stored(output.as_deref()),
        image_type: row.get(6)?,
        has_content: row.get(7)?,
        has_image: row.get(8)?,
    })
}

fn read_contest(row: &rusqlite::Row) -> rusqlite::Result<(i64, f64)> {
    Ok((row.get(0)?, row.get(1)?))
}

impl SqliteTransaction<'_> {
    fn collect_contests(&self, sql: &str, values: &[i64]) -> StoreResult<Vec<ContestInfo>> {
        let mut stmt = self.tx.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), read_contest)?;
        let mut contests = Vec::new();
        for row in rows {
            let (id, start) = row?;
            contests.push(ContestInfo { id, start_time: from_epoch(start)? });
        }
        Ok(contests)
    }

    fn delete_in(&self, table: &str, column: &str, ids: &[i64]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!("DELETE FROM {} WHERE {} IN ({})", table, column, list_param(ids.len()));
        self.tx
            .execute(&sql, params_from_iter(ids.iter()))
            .map_err(constraint)
    }
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn test_cases(&self, problem_id: i64) -> StoreResult<Vec<PersistedTestCase>> {
        let mut stmt = self.tx.prepare_cached(
            "SELECT t.testcaseid, t.orig_input_filename, t.description, t.rank, \
                    t.md5sum_input, t.md5sum_output, t.image_type, \
                    c.testcaseid IS NOT NULL, c.image IS NOT NULL \
             FROM testcase t LEFT JOIN testcase_content c ON c.testcaseid = t.testcaseid \
             WHERE t.probid = ?1 ORDER BY t.rank",
        )?;
        let rows = stmt.query_map(params![problem_id], read_test_case)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn contests_for_problem(&self, problem_id: i64) -> StoreResult<Vec<ContestInfo>> {
        self.collect_contests(
            "SELECT c.cid, c.starttime FROM contest c \
             JOIN contestproblem cp ON cp.cid = c.cid \
             WHERE cp.probid = ? ORDER BY c.cid",
            &[problem_id],
        )
    }

    fn contests(&self, contest_ids: &[i64]) -> StoreResult<Vec<ContestInfo>> {
        if contest_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT cid, starttime FROM contest WHERE cid IN ({}) ORDER BY cid",
            list_param(contest_ids.len())
        );
        self.collect_contests(&sql, contest_ids)
    }

    fn submissions(
        &self,
        problem_id: i64,
        team_ids: &[i64],
        contest_ids: &[i64],
    ) -> StoreResult<Vec<SubmissionRow>> {
        if team_ids.is_empty() || contest_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT submitid, origsubmitid, teamid, cid, langid, submittime, expected_results \
             FROM submission WHERE probid = ? AND teamid IN ({}) AND cid IN ({}) ORDER BY submitid",
            list_param(team_ids.len()),
            list_param(contest_ids.len())
        );
        let values: Vec<i64> = std::iter::once(problem_id)
            .chain(team_ids.iter().copied())
            .chain(contest_ids.iter().copied())
            .collect();
        let mut stmt = self.tx.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(values.iter()))?;
        let mut submissions = Vec::new();
        while let Some(row) = rows.next()? {
            submissions.push(SubmissionRow {
                id: row.get(0)?,
                predecessor_id: row.get(1)?,
                team_id: row.get(2)?,
                contest_id: row.get(3)?,
                language: row.get(4)?,
                submit_time: from_epoch(row.get(5)?)?,
                expected_results: row.get(6)?,
            });
        }
        Ok(submissions)
    }

    fn submission_files(&self, submission_ids: &[i64]) -> StoreResult<Vec<SubmissionFileRow>> {
        if submission_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT submitid, filename, md5sum FROM submission_file \
             WHERE submitid IN ({}) ORDER BY submitid, rank",
            list_param(submission_ids.len())
        );
        let mut stmt = self.tx.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(submission_ids.iter()))?;
        let mut files = Vec::new();
        while let Some(row) = rows.next()? {
            let hash: String = row.get(2)?;
            files.push(SubmissionFileRow {
                submission_id: row.get(0)?,
                file_name: row.get(1)?,
                hash: Fingerprint::from_hex(&hash)
                    .map_err(|e| StoreError::InvalidValue(format!("file hash {:?}: {}", hash, e)))?,
            });
        }
        Ok(files)
    }

    fn insert_test_case(&mut self, problem_id: i64, record: &TestCaseRecord, rank: i64) -> StoreResult<i64> {
        self.tx
            .execute(
                "INSERT INTO testcase (probid, rank, orig_input_filename, description, \
                 md5sum_input, md5sum_output, sample, image_type, deleted) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)",
                params![
                    problem_id,
                    rank,
                    record.name,
                    record.description,
                    record.input_hash.as_str(),
                    record.output_hash.as_str(),
                    record.sample,
                    record.image_type,
                ],
            )
            .map_err(constraint)?;
        Ok(self.tx.last_insert_rowid())
    }

    fn overwrite_test_case(&mut self, id: i64, record: &TestCaseRecord) -> StoreResult<()> {
        let changed = self.tx.execute(
            "UPDATE testcase SET orig_input_filename = ?1, description = ?2, md5sum_input = ?3, \
             md5sum_output = ?4, sample = ?5, image_type = ?6, deleted = 0 WHERE testcaseid = ?7",
            params![
                record.name,
                record.description,
                record.input_hash.as_str(),
                record.output_hash.as_str(),
                record.sample,
                record.image_type,
                id,
            ],
        )?;
        expect_one(changed, "test case", id)
    }

    fn update_test_case_description(&mut self, id: i64, description: Option<&str>) -> StoreResult<()> {
        let changed = self.tx.execute(
            "UPDATE testcase SET description = ?1 WHERE testcaseid = ?2",
            params![description, id],
        )?;
        expect_one(changed, "test case", id)
    }

    fn update_test_case_hashes(
        &mut self,
        id: i64,
        input_hash: &Fingerprint,
        output_hash: &Fingerprint,
        image_type: Option<&str>,
    ) -> StoreResult<()> {
        let changed = self.tx.execute(
            "UPDATE testcase SET md5sum_input = ?1, md5sum_output = ?2, image_type = ?3 WHERE testcaseid = ?4",
            params![input_hash.as_str(), output_hash.as_str(), image_type, id],
        )?;
        expect_one(changed, "test case", id)
    }

    fn set_test_case_rank(&mut self, id: i64, rank: i64) -> StoreResult<()> {
        let changed = self
            .tx
            .execute("UPDATE testcase SET rank = ?1 WHERE testcaseid = ?2", params![rank, id])
            .map_err(constraint)?;
        expect_one(changed, "test case", id)
    }

    fn write_test_case_content(&mut self, id: i64, content: &TestCaseContent) -> StoreResult<()> {
        self.tx
            .execute(
                "INSERT INTO testcase_content (testcaseid, input, output, image, image_thumb) \
                 VALUES (?1, ?2, ?3, ?4, NULL) \
                 ON CONFLICT(testcaseid) DO UPDATE SET input = excluded.input, \
                 output = excluded.output, image = excluded.image, image_thumb = NULL",
                params![id, content.input, content.output, content.image],
            )
            .map_err(constraint)?;
        Ok(())
    }

    fn clear_test_case_images(&mut self, ids: &[i64]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE testcase_content SET image = NULL, image_thumb = NULL WHERE testcaseid IN ({})",
            list_param(ids.len())
        );
        Ok(self.tx.execute(&sql, params_from_iter(ids.iter()))?)
    }

    fn delete_test_case_contents(&mut self, ids: &[i64]) -> StoreResult<usize> {
        self.delete_in("testcase_content", "testcaseid", ids)
    }

    fn delete_test_cases(&mut self, ids: &[i64]) -> StoreResult<usize> {
        self.delete_in("testcase", "testcaseid", ids)
    }

    fn insert_submission(&mut self, submission: &NewSubmission<'_>) -> StoreResult<i64> {
        self.tx
            .execute(
                "INSERT INTO submission (origsubmitid, cid, teamid, probid, langid, submittime, valid, expected_results) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
                params![
                    submission.predecessor_id,
                    submission.contest_id,
                    submission.team_id,
                    submission.problem_id,
                    submission.language,
                    to_epoch(submission.submit_time),
                    submission.expected_results,
                ],
            )
            .map_err(constraint)?;
        Ok(self.tx.last_insert_rowid())
    }

    fn insert_submission_file(
        &mut self,
        submission_id: i64,
        file_name: &str,
        rank: i64,
        source: &[u8],
    ) -> StoreResult<()> {
        self.tx
            .execute(
                "INSERT INTO submission_file (submitid, filename, rank, sourcecode, md5sum) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![submission_id, file_name, rank, source, Fingerprint::of(source).as_str()],
            )
            .map_err(constraint)?;
        Ok(())
    }

    fn update_submission_metadata(
        &mut self,
        id: i64,
        submit_time: DateTime<Utc>,
        expected_results: &str,
    ) -> StoreResult<()> {
        let changed = self.tx.execute(
            "UPDATE submission SET submittime = ?1, expected_results = ?2 WHERE submitid = ?3",
            params![to_epoch(submit_time), expected_results, id],
        )?;
        expect_one(changed, "submission", id)
    }

    fn delete_submission_files(&mut self, submission_ids: &[i64]) -> StoreResult<usize> {
        self.delete_in("submission_file", "submitid", submission_ids)
    }

    fn delete_submissions(&mut self, submission_ids: &[i64]) -> StoreResult<usize> {
        self.delete_in("submission", "submitid", submission_ids)
    }

    fn begin_phase(&mut self, name: &str) -> StoreResult<()> {
        self.tx.execute_batch(&format!("SAVEPOINT \"{}\"", name))?;
        Ok(())
    }

    fn end_phase(&mut self, name: &str) -> StoreResult<()> {
        self.tx.execute_batch(&format!("RELEASE \"{}\"", name))?;
        Ok(())
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn record(name: &str) -> TestCaseRecord {
        TestCaseRecord {
            name: name.to_string(),
            description: None,
            input_hash: Fingerprint::of(name.as_bytes()),
            output_hash: Fingerprint::of(b"out"),
            sample: false,
            image_type: None,
        }
    }

    fn content() -> TestCaseContent {
        TestCaseContent {
            input: b"1 2\n".to_vec(),
            output: b"3\n".to_vec(),
            image: Some(vec![0x89, 0x50]),
        }
    }

    #[test]
    fn test_open_file_database() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("judge.sqlite");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.ensure_problem("hello", "Hello").unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.problem_id("hello").unwrap().is_some());
    }

    #[test]
    fn test_ensure_helpers_are_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let problem = store.ensure_problem("hello", "Hello").unwrap();
        assert_eq!(store.ensure_problem("hello", "Hello World").unwrap(), problem);
        let team = store.ensure_team("jury").unwrap();
        assert_eq!(store.ensure_team("jury").unwrap(), team);
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let contest = store.ensure_contest("final", start).unwrap();
        assert_eq!(store.ensure_contest("final", start).unwrap(), contest);
        store.link_contest_problem(contest, problem, "A").unwrap();
        store.link_contest_problem(contest, problem, "B").unwrap();
        assert_eq!(store.team_id("nobody").unwrap(), None);
    }

    #[test]
    fn test_duplicate_rank_rejected() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let problem = store.ensure_problem("p", "P").unwrap();
        let mut tx = store.begin().unwrap();
        let first = tx.insert_test_case(problem, &record("a"), 1).unwrap();
        let second = tx.insert_test_case(problem, &record("b"), 2).unwrap();
        assert!(matches!(
            tx.set_test_case_rank(second, 1),
            Err(StoreError::Constraint(_))
        ));
        tx.set_test_case_rank(first, 3).unwrap();
        tx.set_test_case_rank(second, 1).unwrap();
        let cases = tx.test_cases(problem).unwrap();
        assert_eq!(cases.iter().map(|c| c.rank).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_content_upsert_resets_thumbnail() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let problem = store.ensure_problem("p", "P").unwrap();
        let mut tx = store.begin().unwrap();
        let id = tx.insert_test_case(problem, &record("a"), 1).unwrap();
        let cases = tx.test_cases(problem).unwrap();
        assert!(!cases[0].has_content);
        assert_eq!(cases[0].input_hash, Some(Fingerprint::of(b"a")));

        tx.write_test_case_content(id, &content()).unwrap();
        tx.commit().unwrap();
        store
            .connection()
            .execute("UPDATE testcase_content SET image_thumb = x'00'", [])
            .unwrap();

        let mut tx = store.begin().unwrap();
        tx.write_test_case_content(id, &content()).unwrap();
        let cases = tx.test_cases(problem).unwrap();
        assert!(cases[0].has_content && cases[0].has_image);
        assert_eq!(tx.clear_test_case_images(&[id]).unwrap(), 1);
        assert!(!tx.test_cases(problem).unwrap()[0].has_image);
        tx.commit().unwrap();

        let thumb: Option<Vec<u8>> = store
            .connection()
            .query_row("SELECT image_thumb FROM testcase_content", [], |r| r.get(0))
            .unwrap();
        assert_eq!(thumb, None);
    }

    #[test]
    fn test_uncommitted_transaction_rolls_back() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let problem = store.ensure_problem("p", "P").unwrap();
        {
            let mut tx = store.begin().unwrap();
            tx.insert_test_case(problem, &record("a"), 1).unwrap();
        }
        let tx = store.begin().unwrap();
        assert!(tx.test_cases(problem).unwrap().is_empty());
    }

    #[test]
    fn test_phases_nest_inside_transaction() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let problem = store.ensure_problem("p", "P").unwrap();
        let mut tx = store.begin().unwrap();
        let id = tx.insert_test_case(problem, &record("a"), 1).unwrap();
        tx.begin_phase("rank_phase_one").unwrap();
        tx.set_test_case_rank(id, 5).unwrap();
        tx.end_phase("rank_phase_one").unwrap();
        tx.commit().unwrap();
        let tx = store.begin().unwrap();
        assert_eq!(tx.test_cases(problem).unwrap()[0].rank, 5);
    }

    #[test]
    fn test_submissions_filtered_and_joined() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let problem = store.ensure_problem("p", "P").unwrap();
        let jury = store.ensure_team("jury").unwrap();
        let other = store.ensure_team("other").unwrap();
        let start = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let contest = store.ensure_contest("final", start).unwrap();
        store.link_contest_problem(contest, problem, "A").unwrap();

        let mut tx = store.begin().unwrap();
        let mut ids = Vec::new();
        for team_id in [jury, other] {
            let id = tx
                .insert_submission(&NewSubmission {
                    predecessor_id: None,
                    contest_id: contest,
                    team_id,
                    problem_id: problem,
                    language: "py3",
                    submit_time: start,
                    expected_results: r#"["correct"]"#.to_string(),
                })
                .unwrap();
            tx.insert_submission_file(id, "main.py", 1, b"print(1)").unwrap();
            ids.push(id);
        }

        assert_eq!(tx.contests_for_problem(problem).unwrap(), vec![ContestInfo { id: contest, start_time: start }]);
        assert_eq!(tx.contests(&[contest, 999]).unwrap().len(), 1);

        let rows = tx.submissions(problem, &[jury], &[contest]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].submit_time, start);
        let files = tx.submission_files(&[rows[0].id]).unwrap();
        assert_eq!(files[0].hash, Fingerprint::of(b"print(1)"));

        assert!(tx.submissions(problem, &[], &[contest]).unwrap().is_empty());
        assert!(matches!(tx.delete_submissions(&ids), Err(StoreError::Constraint(_))));
        assert_eq!(tx.delete_submission_files(&ids).unwrap(), 2);
        assert_eq!(tx.delete_submissions(&ids).unwrap(), 2);
    }

    #[test]
    fn test_deleting_predecessor_unlinks_successor() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let problem = store.ensure_problem("p", "P").unwrap();
        let team = store.ensure_team("jury").unwrap();
        let start = Utc.timestamp_opt(0, 0).unwrap();
        let contest = store.ensure_contest("c", start).unwrap();
        let mut tx = store.begin().unwrap();
        let mut submission = NewSubmission {
            predecessor_id: None,
            contest_id: contest,
            team_id: team,
            problem_id: problem,
            language: "py3",
            submit_time: start,
            expected_results: "[]".to_string(),
        };
        let root = tx.insert_submission(&submission).unwrap();
        submission.predecessor_id = Some(root);
        let head = tx.insert_submission(&submission).unwrap();
        tx.delete_submissions(&[root]).unwrap();
        let rows = tx.submissions(problem, &[team], &[contest]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].id, rows[0].predecessor_id), (head, None));
    }
}
