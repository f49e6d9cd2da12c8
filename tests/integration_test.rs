//! Integration tests for sparkify-lake

use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use sparkify_lake::config::Config;
use sparkify_lake::error::{PipelineError, SessionError};
use sparkify_lake::model::{ArtistRow, SongRow, SongplayRow, TimeRow, UserRow};
use sparkify_lake::sink::read_rows;
use sparkify_lake::{StorageProvider, StorageProviderRef, run_pipeline};

fn write_ndjson(path: &Path, records: &[serde_json::Value]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let body: Vec<String> = records.iter().map(|r| r.to_string()).collect();
    fs::write(path, body.join("\n")).unwrap();
}

fn config_for(input: &TempDir, output: &TempDir) -> Config {
    let yaml = format!(
        r#"
input:
  path: "{}"
  batch_size: 2
  max_concurrent_files: 2
output:
  path: "{}"
  compression: zstd
"#,
        input.path().display(),
        output.path().display()
    );
    Config::from_yaml(&yaml).unwrap()
}

async fn open(dir: &TempDir) -> StorageProviderRef {
    let url = dir.path().to_str().unwrap();
    Arc::new(
        StorageProvider::for_url_with_options(url, HashMap::new())
            .await
            .unwrap(),
    )
}

/// Every file under `dir` keyed by its relative path.
fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, files: &mut BTreeMap<String, Vec<u8>>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, files);
            } else {
                let relative = path.strip_prefix(root).unwrap().to_string_lossy().into_owned();
                files.insert(relative, fs::read(&path).unwrap());
            }
        }
    }

    let mut files = BTreeMap::new();
    walk(dir, dir, &mut files);
    files
}

mod end_to_end {
    use super::*;

    fn minimal_inputs(input: &TempDir) {
        write_ndjson(
            &input.path().join("song_data/A/A/A/TRAAAAW128F429D538.json"),
            &[json!({
                "num_songs": 1,
                "artist_id": "A1",
                "artist_latitude": null,
                "artist_longitude": null,
                "artist_location": "",
                "artist_name": "Band",
                "song_id": "S1",
                "title": "Foo",
                "duration": 200.0,
                "year": 2000
            })],
        );
        write_ndjson(
            &input.path().join("log_data/2001/09/2001-09-09-events.json"),
            &[json!({
                "artist": "Band",
                "auth": "Logged In",
                "firstName": "Ada",
                "gender": "F",
                "lastName": "Lovelace",
                "level": "paid",
                "location": "London",
                "page": "NextSong",
                "sessionId": 42,
                "song": "Foo",
                "ts": 1_000_000_000_000_i64,
                "userAgent": "Mozilla/5.0",
                "userId": "7"
            })],
        );
    }

    #[tokio::test]
    async fn test_single_song_single_play() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        minimal_inputs(&input);

        let stats = run_pipeline(config_for(&input, &output)).await.unwrap();
        assert_eq!(stats.song_play_events, 1);
        for table in ["songs", "artists", "users", "time", "songplays"] {
            assert_eq!(stats.table(table).unwrap().rows, 1, "table {table}");
        }

        let out = output.path();
        assert!(out.join("songs/songs.parquet/_SUCCESS").exists());
        assert!(
            out.join("songs/songs.parquet/year=2000/artist_id=A1/part-00000.parquet")
                .exists()
        );
        assert!(out.join("artists/artists.parquet/part-00000.parquet").exists());
        assert!(out.join("users/users.parquet/part-00000.parquet").exists());
        assert!(
            out.join("time/time.parquet/year=2001/month=9/part-00000.parquet")
                .exists()
        );
        assert!(
            out.join("songplays/songplays.parquet/year=2001/month=9/part-00000.parquet")
                .exists()
        );

        let storage = open(&output).await;

        let songs = read_rows::<SongRow>(&storage).await.unwrap();
        assert_eq!(songs.len(), 1);
        assert_eq!(songs[0].song_id, "S1");
        assert_eq!(songs[0].year, Some(2000));
        assert_eq!(songs[0].artist_id.as_deref(), Some("A1"));

        let artists = read_rows::<ArtistRow>(&storage).await.unwrap();
        assert_eq!(artists[0].artist_id, "A1");
        assert_eq!(artists[0].artist_latitude, None);

        let users = read_rows::<UserRow>(&storage).await.unwrap();
        assert_eq!(users[0].user_id, "7");
        assert_eq!(users[0].last_name.as_deref(), Some("Lovelace"));

        let time = read_rows::<TimeRow>(&storage).await.unwrap();
        assert_eq!(
            time,
            vec![TimeRow {
                start_time: 1_000_000_000_000,
                hour: 1,
                day: 9,
                week: 36,
                weekday: 6,
                year: 2001,
                month: 9,
            }]
        );

        let plays = read_rows::<SongplayRow>(&storage).await.unwrap();
        assert_eq!(
            plays,
            vec![SongplayRow {
                start_time: Some(1_000_000_000_000),
                user_id: Some("7".to_string()),
                level: Some("paid".to_string()),
                song_id: Some("S1".to_string()),
                artist_id: Some("A1".to_string()),
                session_id: Some(42),
                location: Some("London".to_string()),
                user_agent: Some("Mozilla/5.0".to_string()),
                year: Some(2001),
                month: Some(9),
            }]
        );
    }

    #[tokio::test]
    async fn test_filters_and_dedup() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();

        let song = |id: Option<&str>, title: &str, artist: Option<&str>| {
            json!({
                "song_id": id,
                "title": title,
                "artist_id": artist,
                "artist_name": "Band",
                "year": 2000,
                "duration": 180.5
            })
        };
        write_ndjson(
            &input.path().join("song_data/A/A/A/one.json"),
            &[song(Some("S1"), "Foo", Some("A1"))],
        );
        write_ndjson(
            &input.path().join("song_data/A/A/B/two.json"),
            &[song(Some("S1"), "Foo", Some("A1"))],
        );
        write_ndjson(
            &input.path().join("song_data/A/B/A/three.json"),
            &[song(None, "Bar", Some("A2"))],
        );

        let event = |page: &str, user: serde_json::Value, song: Option<&str>, ts: Option<i64>| {
            json!({
                "page": page,
                "userId": user,
                "firstName": "Ada",
                "song": song,
                "ts": ts,
                "level": "free"
            })
        };
        write_ndjson(
            &input.path().join("log_data/2018/11/2018-11-01-events.json"),
            &[
                event("NextSong", json!("7"), Some("Foo"), Some(1_541_105_830_796)),
                event("NextSong", json!("7"), Some("Foo"), Some(1_541_105_830_796)),
                event("Home", json!("8"), None, Some(1_541_106_106_796)),
                event("NextSong", json!(null), Some("Foo"), Some(1_541_106_352_796)),
                event("NextSong", json!(10), Some("Nope"), Some(1_541_107_000_000)),
                event("NextSong", json!("11"), Some("Foo"), None),
            ],
        );

        let stats = run_pipeline(config_for(&input, &output)).await.unwrap();
        assert_eq!(stats.song_files, 3);
        assert_eq!(stats.song_records, 3);
        assert_eq!(stats.log_records, 6);
        assert_eq!(stats.song_play_events, 5);

        let storage = open(&output).await;

        let songs = read_rows::<SongRow>(&storage).await.unwrap();
        assert_eq!(songs.len(), 1);

        let mut artists: Vec<_> = read_rows::<ArtistRow>(&storage)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.artist_id)
            .collect();
        artists.sort();
        assert_eq!(artists, vec!["A1", "A2"]);

        let mut users: Vec<_> = read_rows::<UserRow>(&storage)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.user_id)
            .collect();
        users.sort();
        assert_eq!(users, vec!["10", "11", "7"]);

        let time = read_rows::<TimeRow>(&storage).await.unwrap();
        assert_eq!(time.len(), 3);
        assert!(time.iter().all(|t| t.year == 2018 && t.month == 11));

        // Both plays of "Foo" by user 7, the anonymous play, and the play
        // without a timestamp. "Nope" has no matching song.
        let plays = read_rows::<SongplayRow>(&storage).await.unwrap();
        assert_eq!(plays.len(), 4);
        assert!(plays.iter().all(|p| p.song_id.as_deref() == Some("S1")));
        let undated: Vec<_> = plays.iter().filter(|p| p.start_time.is_none()).collect();
        assert_eq!(undated.len(), 1);
        assert_eq!(undated[0].year, None);
        assert!(
            output
                .path()
                .join("songplays/songplays.parquet/year=__HIVE_DEFAULT_PARTITION__/month=__HIVE_DEFAULT_PARTITION__/part-00000.parquet")
                .exists()
        );
    }

    #[tokio::test]
    async fn test_other_pages_with_known_titles_are_not_song_plays() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        minimal_inputs(&input);

        let other = |page: &str, user: &str| {
            json!({
                "page": page,
                "userId": user,
                "firstName": "Eve",
                "song": "Foo",
                "ts": 1_000_000_500_000_i64,
                "level": "free"
            })
        };
        write_ndjson(
            &input.path().join("log_data/2001/09/2001-09-10-events.json"),
            &[other("Home", "8"), other("nextsong", "9")],
        );

        let stats = run_pipeline(config_for(&input, &output)).await.unwrap();
        assert_eq!(stats.log_records, 3);
        assert_eq!(stats.song_play_events, 1);

        let storage = open(&output).await;
        let plays = read_rows::<SongplayRow>(&storage).await.unwrap();
        let play_users: Vec<_> = plays.iter().map(|p| p.user_id.as_deref()).collect();
        assert_eq!(play_users, vec![Some("7")]);

        let users: Vec<_> = read_rows::<UserRow>(&storage)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.user_id)
            .collect();
        assert_eq!(users, vec!["7"]);
        assert_eq!(read_rows::<TimeRow>(&storage).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rerun_is_byte_identical() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        minimal_inputs(&input);

        run_pipeline(config_for(&input, &output)).await.unwrap();
        let first = snapshot(output.path());

        run_pipeline(config_for(&input, &output)).await.unwrap();
        let second = snapshot(output.path());

        assert!(!first.is_empty());
        assert_eq!(
            first.keys().collect::<Vec<_>>(),
            second.keys().collect::<Vec<_>>()
        );
        assert!(first == second, "rerun changed file contents");
    }

    #[tokio::test]
    async fn test_rerun_replaces_stale_partitions() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        minimal_inputs(&input);

        let stale = output
            .path()
            .join("songs/songs.parquet/year=1999/artist_id=OLD/part-00000.parquet");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, b"stale").unwrap();

        run_pipeline(config_for(&input, &output)).await.unwrap();

        assert!(!stale.exists());
        let storage = open(&output).await;
        let songs = read_rows::<SongRow>(&storage).await.unwrap();
        assert_eq!(songs.len(), 1);
    }

    #[tokio::test]
    async fn test_gzip_inputs() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        minimal_inputs(&input);

        let log = input.path().join("log_data/2001/09/2001-09-09-events.json");
        let raw = fs::read(&log).unwrap();
        fs::remove_file(&log).unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).unwrap();
        fs::write(log.with_extension("json.gz"), encoder.finish().unwrap()).unwrap();

        let mut config = config_for(&input, &output);
        config.input.log_glob = "log_data/*/*/*.json.gz".to_string();

        let stats = run_pipeline(config).await.unwrap();
        assert_eq!(stats.table("songplays").unwrap().rows, 1);
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn test_missing_song_files() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();

        let err = run_pipeline(config_for(&input, &output)).await.unwrap_err();
        assert!(
            matches!(err, PipelineError::NoInputFiles { ref dataset, .. } if dataset == "song"),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn test_songs_remain_when_log_stage_fails() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_ndjson(
            &input.path().join("song_data/A/A/A/one.json"),
            &[json!({"song_id": "S1", "title": "Foo", "artist_id": "A1"})],
        );

        let err = run_pipeline(config_for(&input, &output)).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoInputFiles { .. }));
        assert!(output.path().join("songs/songs.parquet/_SUCCESS").exists());
        assert!(!output.path().join("users").exists());
    }

    #[tokio::test]
    async fn test_object_store_without_credentials() {
        let output = TempDir::new().unwrap();
        let yaml = format!(
            "input:\n  path: \"s3a://udacity-dend/\"\noutput:\n  path: \"{}\"\n",
            output.path().display()
        );
        let config = Config::from_yaml(&yaml).unwrap();

        let err = run_pipeline(config).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Session {
                source: SessionError::MissingCredentials { .. }
            }
        ));
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn test_config_file_with_env_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("etl.yaml");
        fs::write(
            &path,
            r#"
input:
  path: "${SPARKIFY_TEST_UNSET_INPUT:-/data/raw}"
output:
  path: "${SPARKIFY_TEST_UNSET_OUTPUT:-s3a://my-lake/}"
  compression: gzip
  file_size_mb: 64
aws:
  access_key_id: "${SPARKIFY_TEST_UNSET_KEY:-AKIDEXAMPLE}"
  secret_access_key: "${SPARKIFY_TEST_UNSET_SECRET:-secret}"
  region: us-west-2
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.input.path, "/data/raw");
        assert_eq!(config.input.song_glob, "song_data/*/*/*/*.json");
        assert_eq!(config.input.log_glob, "log_data/*/*/*.json");
        assert_eq!(config.output.path, "s3a://my-lake/");
        assert_eq!(config.output.file_size_mb, 64);

        let aws = config.aws.unwrap();
        assert_eq!(aws.access_key_id, "AKIDEXAMPLE");
        assert_eq!(aws.region.as_deref(), Some("us-west-2"));
    }

    #[test]
    fn test_missing_output_is_rejected() {
        assert!(Config::from_yaml("input:\n  path: /data\n").is_err());
    }
}
