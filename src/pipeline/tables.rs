//! Table derivations.
//!
//! Pure functions from decoded records to table rows. Dimension tables are
//! deduplicated on the whole row; every result is sorted so a rerun on the
//! same input writes the same files.

use deltalake::arrow::array::RecordBatch;

use crate::error::ReaderError;
use crate::model::{ArtistRow, EventRecord, SongRecord, SongRow, SongplayRow, TimeRow, UserRow};
use crate::transform::Dataset;

/// Decode batches into records with `decode`.
pub fn decode_batches<T, F>(batches: &[RecordBatch], decode: F) -> Result<Dataset<T>, ReaderError>
where
    F: Fn(&RecordBatch) -> Result<Vec<T>, ReaderError>,
{
    let mut rows = Vec::new();
    for batch in batches {
        rows.extend(decode(batch)?);
    }
    Ok(Dataset::from_rows(rows))
}

/// Distinct songs with a non-null `song_id`.
pub fn songs_table(songs: &Dataset<SongRecord>) -> Dataset<SongRow> {
    songs.filter_map(SongRecord::song_row).distinct()
}

/// Distinct artists with a non-null `artist_id`.
pub fn artists_table(songs: &Dataset<SongRecord>) -> Dataset<ArtistRow> {
    songs.filter_map(SongRecord::artist_row).distinct()
}

/// Events whose page is `NextSong`.
pub fn song_play_events(events: Dataset<EventRecord>) -> Dataset<EventRecord> {
    events.filter(EventRecord::is_song_play)
}

/// Distinct users with a non-null `userId`.
pub fn users_table(events: &Dataset<EventRecord>) -> Dataset<UserRow> {
    events.filter_map(EventRecord::user_row).distinct()
}

/// Distinct event timestamps with their calendar fields.
pub fn time_table(events: &Dataset<EventRecord>) -> Dataset<TimeRow> {
    events.filter_map(EventRecord::time_row).distinct()
}

/// Events joined to songs on `event.song == song.title`.
pub fn songplays_table(events: &Dataset<EventRecord>, songs: &Dataset<SongRow>) -> Dataset<SongplayRow> {
    events
        .inner_join(
            songs,
            |event| event.song.clone(),
            |song| song.title.clone(),
            SongplayRow::from_match,
        )
        .sorted()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Double, TableRow};

    fn song(id: Option<&str>, title: &str, artist: Option<&str>) -> SongRecord {
        SongRecord {
            song_id: id.map(str::to_string),
            title: Some(title.to_string()),
            artist_id: artist.map(str::to_string),
            year: Some(2000),
            duration: Some(200.0),
            artist_name: Some("Band".to_string()),
            ..Default::default()
        }
    }

    fn event(page: &str, user: Option<&str>, song: Option<&str>, ts: i64) -> EventRecord {
        EventRecord {
            user_id: user.map(str::to_string),
            first_name: Some("Ada".to_string()),
            page: Some(page.to_string()),
            ts: Some(ts),
            song: song.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_songs_skip_null_ids_and_dedup() {
        let songs = Dataset::from_rows(vec![
            song(Some("S1"), "Foo", Some("A1")),
            song(Some("S1"), "Foo", Some("A1")),
            song(None, "Bar", Some("A2")),
        ]);

        let table = songs_table(&songs);
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].song_id, "S1");
        assert_eq!(table.rows()[0].duration, Some(Double(200.0)));

        let artists = artists_table(&songs);
        let ids: Vec<_> = artists.iter().map(|a| a.artist_id.as_str()).collect();
        assert_eq!(ids, vec!["A1", "A2"]);
    }

    #[test]
    fn test_differing_rows_with_same_song_id_both_survive() {
        let mut other = song(Some("S1"), "Foo", Some("A1"));
        other.duration = Some(201.0);
        let songs = Dataset::from_rows(vec![song(Some("S1"), "Foo", Some("A1")), other]);

        assert_eq!(songs_table(&songs).len(), 2);
    }

    #[test]
    fn test_signed_zero_duration_is_one_song() {
        let mut negative = song(Some("S1"), "Foo", Some("A1"));
        negative.duration = Some(-0.0);
        let mut positive = song(Some("S1"), "Foo", Some("A1"));
        positive.duration = Some(0.0);
        let songs = songs_table(&Dataset::from_rows(vec![negative, positive]));
        assert_eq!(songs.len(), 1);

        let events = song_play_events(Dataset::from_rows(vec![event(
            "NextSong",
            Some("7"),
            Some("Foo"),
            1_000,
        )]));
        assert_eq!(songplays_table(&events, &songs).len(), 1);
    }

    #[test]
    fn test_non_next_song_pages_never_reach_tables() {
        let songs = songs_table(&Dataset::from_rows(vec![song(Some("S1"), "Foo", Some("A1"))]));
        let events = song_play_events(Dataset::from_rows(vec![
            event("Home", Some("8"), Some("Foo"), 2_000),
            event("nextsong", Some("9"), Some("Foo"), 3_000),
            event("NextSong", Some("7"), Some("Foo"), 1_000),
        ]));

        let plays = songplays_table(&events, &songs);
        let users: Vec<_> = plays.iter().map(|p| p.user_id.as_deref()).collect();
        assert_eq!(users, vec![Some("7")]);

        let user_ids: Vec<_> = users_table(&events).iter().map(|u| u.user_id.clone()).collect();
        assert_eq!(user_ids, vec!["7"]);
        let times: Vec<_> = time_table(&events).iter().map(|t| t.start_time).collect();
        assert_eq!(times, vec![1_000]);
    }

    #[test]
    fn test_only_next_song_events_feed_users_and_time() {
        let events = song_play_events(Dataset::from_rows(vec![
            event("NextSong", Some("7"), Some("Foo"), 1_000),
            event("Home", Some("8"), None, 2_000),
            event("NextSong", None, Some("Foo"), 3_000),
            event("NextSong", Some("7"), Some("Foo"), 1_000),
        ]));

        assert_eq!(events.len(), 3);
        let users = users_table(&events);
        assert_eq!(users.len(), 1);
        assert_eq!(users.rows()[0].user_id, "7");

        let times: Vec<_> = time_table(&events).iter().map(|t| t.start_time).collect();
        assert_eq!(times, vec![1_000, 3_000]);
    }

    #[test]
    fn test_songplays_join_on_title() {
        let songs = songs_table(&Dataset::from_rows(vec![
            song(Some("S1"), "Foo", Some("A1")),
            song(Some("S2"), "Foo", Some("A2")),
            song(Some("S3"), "Baz", Some("A3")),
        ]));
        let events = song_play_events(Dataset::from_rows(vec![
            event("NextSong", Some("7"), Some("Foo"), 1_000_000_000_000),
            event("NextSong", Some("8"), Some("Unknown"), 1_000_000_000_000),
            event("NextSong", Some("9"), None, 1_000_000_000_000),
        ]));

        let plays = songplays_table(&events, &songs);

        let matched: Vec<_> = plays
            .iter()
            .map(|p| (p.user_id.as_deref(), p.song_id.as_deref()))
            .collect();
        assert_eq!(matched, vec![(Some("7"), Some("S1")), (Some("7"), Some("S2"))]);
    }

    #[test]
    fn test_decode_batches_concatenates() {
        let row = song(Some("S1"), "Foo", Some("A1")).song_row().unwrap();
        let batch = SongRow::to_batch(&[&row]).unwrap();

        let decoded = decode_batches(&[batch.clone(), batch], SongRow::from_batch).unwrap();
        assert_eq!(decoded.into_rows(), vec![row.clone(), row]);
    }
}
