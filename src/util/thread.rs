//! Module `thread` implement a generic multi-threading pattern.
//!
//! Threads hold onto their own state and handle all inter-thread
//! communication via channels, in the gen-server style. A [Pool] value
//! groups several such threads behind one request interface, which is
//! how this package bounds its store fan-out.

use std::{mem, sync::mpsc, thread};

use crate::{Error, Result};

/// Thread type, holding a join-handle and the sending end of a bounded
/// request channel.
///
/// When a thread value is dropped, it is made sure that there are no
/// dangling thread routines. To achieve this the thread's main loop
/// should handle the _disconnect_ event on its [Rx] channel.
pub struct Thread<Q, R = (), T = ()> {
    name: String,
    inner: Option<Inner<Q, R, T>>,
}

struct Inner<Q, R, T> {
    handle: thread::JoinHandle<T>,
    tx: Option<Tx<Q, R>>,
}

impl<Q, R, T> Inner<Q, R, T> {
    fn join(mut self) -> Result<T> {
        mem::drop(self.tx.take());

        match self.handle.join() {
            Ok(val) => Ok(val),
            Err(err) => err_at!(ThreadFail, msg: "fail {:?}", err),
        }
    }
}

impl<Q, R, T> Drop for Thread<Q, R, T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.join().ok();
        }
    }
}

impl<Q, R, T> Thread<Q, R, T> {
    /// Create a new Thread instance, using a synchronous channel with
    /// finite buffer. `main_loop` shall be called with the rx side of the
    /// channel and shall return a function that can be spawned with
    /// thread::spawn.
    pub fn new_sync<F, N>(name: &str, chan_size: usize, main_loop: F) -> Thread<Q, R, T>
    where
        F: 'static + FnOnce(Rx<Q, R>) -> N + Send,
        N: 'static + Send + FnOnce() -> T,
        T: 'static + Send,
    {
        let (tx, rx) = mpsc::sync_channel(chan_size);
        let handle = thread::spawn(main_loop(rx));

        Thread {
            name: name.to_string(),
            inner: Some(Inner {
                handle,
                tx: Some(Tx(tx)),
            }),
        }
    }

    /// Recommended way to exit/shutdown the thread. Note that all [Tx]
    /// clones of this thread must also be dropped for this call to return.
    ///
    /// Even otherwise, when Thread value goes out of scope its drop
    /// implementation shall call this method to exit the thread, except
    /// that any errors are ignored.
    pub fn join(mut self) -> Result<T> {
        match self.inner.take() {
            Some(inner) => inner.join(),
            None => err_at!(ThreadFail, msg: "thread {} already joined", self.name),
        }
    }

    /// Return name of this thread.
    pub fn to_name(&self) -> String {
        self.name.to_string()
    }

    /// Return a clone of the tx channel.
    pub fn to_tx(&self) -> Tx<Q, R> {
        match self.inner.as_ref() {
            Some(inner) => match inner.tx.as_ref() {
                Some(tx) => tx.clone(),
                None => unreachable!(),
            },
            None => unreachable!(),
        }
    }
}

/// IPC type wrapping the sending half of a thread's request channel.
///
/// The clone behavior is similar to [mpsc::SyncSender].
pub struct Tx<Q, R = ()>(mpsc::SyncSender<(Q, Option<mpsc::Sender<R>>)>);

impl<Q, R> Clone for Tx<Q, R> {
    fn clone(&self) -> Self {
        Tx(self.0.clone())
    }
}

impl<Q, R> Tx<Q, R> {
    /// Post a message to thread and don't wait for response.
    pub fn post(&self, msg: Q) -> Result<()> {
        err_at!(IPCFail, self.0.send((msg, None)))
    }

    /// Send a request message to thread and wait for a response.
    pub fn request(&self, request: Q) -> Result<R> {
        let (stx, srx) = mpsc::channel();
        err_at!(IPCFail, self.0.send((request, Some(stx))))?;
        err_at!(IPCFail, srx.recv())
    }

    /// Send a request message to thread along with a response channel,
    /// without waiting for the response.
    pub fn request_tx(&self, request: Q, rt_tx: mpsc::Sender<R>) -> Result<()> {
        err_at!(IPCFail, self.0.send((request, Some(rt_tx))))
    }
}

/// IPC type, that shall be passed to the thread's main loop.
///
/// Refer to [Thread::new_sync] for details.
pub type Rx<Q, R = ()> = mpsc::Receiver<(Q, Option<mpsc::Sender<R>>)>;

/// Create a pool of threads of same type.
///
/// That is, every thread's main-loop takes the same request type and
/// returns the same response type. Load balancing across the threads is
/// handled in random fashion.
pub struct Pool<Q, R = (), T = ()> {
    name: String,
    threads: Vec<Thread<Q, R, T>>,
    pool_size: usize,
    chan_size: usize,
}

impl<Q, R, T> Pool<Q, R, T> {
    /// Create a new pool, number of threads in this pool shall default to
    /// number of cores. Each thread shall be created with a size-bounded
    /// input channel.
    pub fn new_sync(name: &str, chan_size: usize) -> Pool<Q, R, T> {
        Pool {
            name: name.to_string(),
            threads: Vec::default(),
            pool_size: num_cpus::get(),
            chan_size,
        }
    }

    pub fn set_pool_size(&mut self, pool_size: usize) -> &mut Self {
        self.pool_size = pool_size;
        self
    }

    /// Spawn all the threads configured for this pool.
    pub fn spawn<F, N>(&mut self, main_loop: F)
    where
        F: 'static + FnOnce(Rx<Q, R>) -> N + Send + Clone,
        N: 'static + Send + FnOnce() -> T,
        T: 'static + Send,
    {
        for i in 0..self.pool_size {
            let (name, main_loop) = (format!("{}-{}", self.name, i), main_loop.clone());
            let thread = Thread::new_sync(&name, self.chan_size, main_loop);
            self.threads.push(thread)
        }
    }

    /// Shutdown all threads, wait for them to exit and cleanup this pool.
    pub fn close_wait(self) -> Result<Vec<T>> {
        let mut results = vec![];
        for th in self.threads.into_iter() {
            results.push(th.join()?)
        }
        Ok(results)
    }
}

impl<Q, R, T> Pool<Q, R, T> {
    /// Return the name of the pool.
    pub fn to_name(&self) -> String {
        self.name.to_string()
    }

    /// Post a message to one of the pool's threads, without waiting for a
    /// response.
    pub fn post(&self, msg: Q) -> Result<()> {
        self.pick_thread()?.to_tx().post(msg)
    }

    /// Send a request message to one of the pool's threads along with a
    /// response channel, without waiting for the response.
    pub fn request_tx(&self, request: Q, rt_tx: mpsc::Sender<R>) -> Result<()> {
        self.pick_thread()?.to_tx().request_tx(request, rt_tx)
    }

    fn pick_thread(&self) -> Result<&Thread<Q, R, T>> {
        if self.threads.is_empty() {
            return err_at!(ThreadFail, msg: "pool {} has no threads", self.name);
        }
        let n: usize = rand::random::<usize>() % self.threads.len();
        Ok(&self.threads[n])
    }
}
