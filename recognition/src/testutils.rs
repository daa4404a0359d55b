use crate::recognizer::{RecognizeError, Recognizer};
use crate::store::{ObjectStore, Reading, ReadingStore, StoreError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bucket contents keyed by `(bucket, key)`.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    failing_gets: Vec<String>,
}

impl MemoryObjectStore {
    pub fn new<'a, I>(objects: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let objects = objects
            .into_iter()
            .map(|(key, data)| (("uploads".to_string(), key.to_string()), data.to_vec()))
            .collect();

        MemoryObjectStore {
            objects: Mutex::new(objects),
            failing_gets: Vec::new(),
        }
    }

    /// Reads of `key` fail.
    pub fn failing_get(mut self, key: &str) -> Self {
        self.failing_gets.push(key.into());
        self
    }

    pub fn object(&self, key: &str) -> Option<serde_json::Value> {
        let objects = self.objects.lock().unwrap();
        objects
            .get(&("uploads".to_string(), key.to_string()))
            .map(|data| serde_json::from_slice(data).unwrap())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn exists(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if self.failing_gets.iter().any(|failing| failing == key) {
            return Err(StoreError::Unavailable(format!("get {key}")));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned())
    }

    async fn put_json(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingReadingStore {
    readings: Mutex<Vec<Reading>>,
    fail: bool,
}

impl RecordingReadingStore {
    pub fn failing() -> Self {
        RecordingReadingStore {
            readings: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn readings(&self) -> Vec<Reading> {
        self.readings.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReadingStore for RecordingReadingStore {
    async fn put(&self, reading: &Reading) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::Timeout("put_item".into()));
        }
        self.readings.lock().unwrap().push(reading.clone());
        Ok(())
    }
}

/// Answers recognition calls from a script, then repeats the last answer.
pub struct ScriptedRecognizer {
    answers: Mutex<VecDeque<Result<String, RecognizeError>>>,
    calls: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn new<I>(answers: I) -> Self
    where
        I: IntoIterator<Item = Result<&'static str, RecognizeError>>,
    {
        ScriptedRecognizer {
            answers: Mutex::new(
                answers
                    .into_iter()
                    .map(|answer| answer.map(String::from))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn recognize(&self, _image: &[u8], _prompt: &str) -> Result<String, RecognizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut answers = self.answers.lock().unwrap();
        if answers.len() > 1 {
            answers.pop_front().unwrap()
        } else {
            answers.front().cloned().unwrap()
        }
    }
}
