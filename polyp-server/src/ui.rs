//! Embedded single-page UI

pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Colonoscopy Polyp Detection</title>
<style>
  body { font-family: sans-serif; margin: 0; background: #111; color: #eee; }
  header { padding: 12px 20px; background: #222; }
  main { display: flex; gap: 20px; padding: 20px; }
  #controls { width: 320px; display: flex; flex-direction: column; gap: 12px; }
  #display { flex: 1; text-align: center; }
  #display img { max-width: 100%; background: #000; min-height: 360px; }
  button { padding: 8px; cursor: pointer; }
  select, input[type=file] { width: 100%; }
  #status { font-size: 0.9em; color: #aaa; white-space: pre-line; }
</style>
</head>
<body>
<header><h2>Colonoscopy Polyp Detection</h2></header>
<main>
  <section id="controls">
    <label>Video <select id="video"></select></label>
    <input type="file" id="upload" accept="video/*">
    <button id="feed">Feed to Endoscope</button>
    <div>
      <button id="pause">Pause</button>
      <button id="resume">Resume</button>
    </div>
    <label><input type="checkbox" id="detection" checked> Bounding Boxes</label>
    <label><input type="checkbox" id="segmentation" checked> Segmentation masks</label>
    <div id="status"></div>
  </section>
  <section id="display">
    <img id="screen" alt="Endoscope display">
  </section>
</main>
<script>
const $ = (id) => document.getElementById(id);

async function api(method, path, body) {
  const init = { method, headers: {} };
  if (body !== undefined) {
    init.headers["content-type"] = "application/json";
    init.body = JSON.stringify(body);
  }
  const res = await fetch(path, init);
  const data = await res.json().catch(() => ({}));
  if (!res.ok) throw new Error(data.error || res.statusText);
  return data;
}

async function loadVideos(selected) {
  const videos = await api("GET", "/api/videos");
  const select = $("video");
  select.innerHTML = "";
  for (const v of videos) {
    const opt = document.createElement("option");
    opt.value = v.name;
    opt.textContent = v.name + (v.origin === "upload" ? " (uploaded)" : "");
    select.appendChild(opt);
  }
  if (selected) select.value = selected;
}

async function refresh() {
  try {
    const s = await api("GET", "/api/state");
    $("detection").checked = s.detection_enabled;
    $("segmentation").checked = s.segmentation_enabled;
    const feed = s.feed;
    $("status").textContent =
      "Video: " + (feed.video || "none") +
      "\nRunning: " + feed.running + (s.paused ? " (paused)" : "") +
      "\nFrames: " + feed.frames_emitted +
      "\nModel: " + s.model.name + " " + s.model.version +
      (feed.error ? "\nError: " + feed.error : "");
  } catch (e) {
    $("status").textContent = e.message;
  }
}

$("upload").addEventListener("change", async (ev) => {
  const file = ev.target.files[0];
  if (!file) return;
  const res = await fetch("/api/videos/" + encodeURIComponent(file.name), { method: "PUT", body: file });
  const data = await res.json().catch(() => ({}));
  if (!res.ok) { alert(data.error || res.statusText); return; }
  await loadVideos(data.name);
});

$("feed").addEventListener("click", async () => {
  try {
    await api("POST", "/api/feed", { video: $("video").value });
    $("screen").src = "/api/stream.mjpg?t=" + Date.now();
  } catch (e) { alert(e.message); }
  refresh();
});

$("pause").addEventListener("click", () => api("POST", "/api/pause").then(refresh));
$("resume").addEventListener("click", () => api("POST", "/api/resume").then(refresh));
$("detection").addEventListener("change", (ev) =>
  api("POST", "/api/detection", { enabled: ev.target.checked }).then(refresh));
$("segmentation").addEventListener("change", (ev) =>
  api("POST", "/api/segmentation", { enabled: ev.target.checked }).then(refresh));

loadVideos();
refresh();
setInterval(refresh, 1000);
</script>
</body>
</html>
"#;
